//! Pull synchronization: submission store into publication store.
//!
//! One run fetches the full approved set, upserts every record in isolation,
//! then hands the same set to the deletion detector.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use super::deletion::{ApprovedSet, DeletionDetector};
use super::error::{SyncError, SyncResult};
use super::identity::{IdentityResolver, Resolution};
use super::mapper::{self, MappedSubmission};
use super::portal::SubmissionPortal;
use super::summary::{RunOutcome, SyncOperation, SyncSummary};
use crate::models::{ApplicationId, SubmissionRecord, Tournament};
use crate::services::PublicationStore;
use crate::util::sanitize;
use crate::Error;

/// What happened to one upstream record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created { tournament: Tournament },
    Updated { tournament: Tournament },
    /// An unlinked row matched by name acquired the cross-reference id
    Linked { tournament: Tournament },
    Unchanged,
    Skipped { reason: &'static str },
}

impl UpsertOutcome {
    pub const fn wrote(&self) -> bool {
        matches!(
            self,
            Self::Created { .. } | Self::Updated { .. } | Self::Linked { .. }
        )
    }
}

#[derive(Clone)]
pub struct PullSynchronizer {
    store: PublicationStore,
    portal: Arc<dyn SubmissionPortal>,
    resolver: IdentityResolver,
    detector: DeletionDetector,
    run_lock: Arc<Mutex<()>>,
}

impl PullSynchronizer {
    pub fn new(store: PublicationStore, portal: Arc<dyn SubmissionPortal>) -> Self {
        Self {
            resolver: IdentityResolver::new(store.clone()),
            detector: DeletionDetector::new(store.clone(), Arc::clone(&portal)),
            store,
            portal,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Run one full pull. Refuses to overlap with a run already in progress.
    ///
    /// Returns `Err` only when the approved-set fetch itself fails; the
    /// aborted run is still persisted.
    pub async fn run(&self) -> SyncResult<SyncSummary> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::info!("Pull requested while another run is in progress");
            return Err(SyncError::AlreadyRunning);
        };

        let mut summary = SyncSummary::start();
        tracing::info!("Starting pull synchronization");

        let records = match self.portal.list_approved().await {
            Ok(records) => records,
            Err(error) => {
                let error = SyncError::from(error);
                summary.record_failure(SyncOperation::Fetch, None, None, &error);
                let summary = summary.finish(RunOutcome::Aborted);
                self.persist(&summary).await;
                tracing::error!(
                    kind = %error.kind(),
                    "Pull aborted; approved submissions could not be fetched: {}",
                    sanitize(&error)
                );
                return Err(error);
            }
        };

        let approved_records: Vec<&SubmissionRecord> =
            records.iter().filter(|record| listed_as_approved(record)).collect();
        let approved = ApprovedSet::from_records(approved_records.iter().copied());
        if approved.is_empty() {
            tracing::warn!("Approved set is empty; every deletion must be confirmed upstream");
        } else {
            tracing::debug!(approved = approved.len(), "Fetched approved submissions");
        }

        let mut seen = HashSet::new();
        for record in approved_records {
            let application_id = record.application_id();
            if let Some(id) = &application_id {
                if !seen.insert(id.clone()) {
                    tracing::debug!(application_id = %id, "Duplicate submission in batch; ignored");
                    continue;
                }
            }
            let label = application_id.as_ref().map(ApplicationId::as_str);

            let mapped = match mapper::to_publication(record) {
                Ok(mapped) => mapped,
                Err(error) => {
                    summary.record_failure(SyncOperation::Map, label, None, &error.into());
                    continue;
                }
            };

            let resolution = match self.resolve(&mapped).await {
                Ok(resolution) => resolution,
                Err(error) => {
                    summary.record_failure(SyncOperation::Resolve, label, None, &error);
                    continue;
                }
            };

            match self.apply_resolution(&mapped, resolution).await {
                Ok(outcome) => tally(&mut summary, &outcome),
                Err(error) => summary.record_failure(SyncOperation::Upsert, label, None, &error),
            }
        }

        self.detector.detect(&approved, &mut summary).await;

        let summary = summary.finish(RunOutcome::Completed);
        self.persist(&summary).await;
        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            linked = summary.linked,
            skipped = summary.skipped,
            deleted = summary.deleted,
            errors = summary.errors.len(),
            "Pull synchronization finished"
        );
        Ok(summary)
    }

    /// Fetch one application and upsert it, outside the batch cycle
    pub async fn sync_one(&self, application_id: &ApplicationId) -> SyncResult<UpsertOutcome> {
        let record = self.portal.get_application(application_id).await?;
        if !record.status().is_approved() {
            tracing::info!(
                application_id = %application_id,
                status = %record.status(),
                "Single-record pull skipped; submission is not approved"
            );
            return Ok(UpsertOutcome::Skipped {
                reason: "not_approved",
            });
        }

        let mapped = mapper::to_publication(&record)?;
        let outcome = self.upsert(&mapped).await?;
        tracing::info!(application_id = %application_id, ?outcome, "Single-record pull applied");
        Ok(outcome)
    }

    async fn upsert(&self, mapped: &MappedSubmission) -> SyncResult<UpsertOutcome> {
        let resolution = self.resolve(mapped).await?;
        self.apply_resolution(mapped, resolution).await
    }

    async fn resolve(&self, mapped: &MappedSubmission) -> SyncResult<Resolution> {
        Ok(self
            .resolver
            .resolve_for_pull(
                &mapped.application_id,
                &mapped.fields.name,
                mapped.fields.start_date,
            )
            .await?)
    }

    async fn apply_resolution(
        &self,
        mapped: &MappedSubmission,
        resolution: Resolution,
    ) -> SyncResult<UpsertOutcome> {
        let outcome = match resolution {
            Resolution::Unresolved => {
                match self
                    .store
                    .insert_linked(&mapped.fields, &mapped.application_id, mapped.last_updated)
                    .await
                {
                    Ok(tournament) => UpsertOutcome::Created { tournament },
                    // Another pull linked the application after resolution
                    Err(error @ Error::DuplicateCrossRef(_)) => {
                        let Some(existing) =
                            self.store.find_by_cross_ref(&mapped.application_id).await?
                        else {
                            return Err(error.into());
                        };
                        tracing::debug!(
                            application_id = %mapped.application_id,
                            tournament_id = %existing.id,
                            "Application was linked concurrently; refreshing instead"
                        );
                        self.refresh_linked(&existing, mapped).await?
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            Resolution::ById(existing) => self.refresh_linked(&existing, mapped).await?,
            Resolution::ByNameHeuristic { tournament, .. } => {
                let tournament = self.apply(&tournament, mapped).await?;
                tracing::info!(
                    application_id = %mapped.application_id,
                    tournament_id = %tournament.id,
                    "Linked existing tournament by name and start date"
                );
                UpsertOutcome::Linked { tournament }
            }
        };
        Ok(outcome)
    }

    async fn refresh_linked(
        &self,
        existing: &Tournament,
        mapped: &MappedSubmission,
    ) -> SyncResult<UpsertOutcome> {
        if existing.is_local() {
            tracing::debug!(
                application_id = %mapped.application_id,
                tournament_id = %existing.id,
                "Linked tournament has an unpushed local edit; pull skipped"
            );
            return Ok(UpsertOutcome::Skipped {
                reason: "local_edit_pending",
            });
        }
        if !needs_refresh(existing, mapped) {
            return Ok(UpsertOutcome::Unchanged);
        }
        let tournament = self.apply(existing, mapped).await?;
        Ok(UpsertOutcome::Updated { tournament })
    }

    async fn apply(&self, existing: &Tournament, mapped: &MappedSubmission) -> SyncResult<Tournament> {
        Ok(self
            .store
            .apply_upstream(
                &existing.id,
                existing.version,
                &mapped.fields,
                &mapped.application_id,
                mapped.last_updated,
            )
            .await?)
    }

    pub(crate) async fn persist(&self, summary: &SyncSummary) {
        if let Err(error) = self.store.record_sync_run(&summary.to_run_record()).await {
            tracing::warn!("Failed to persist sync run summary: {}", sanitize(&error));
        }
    }
}

/// Lists may omit `status` since every entry is approved by definition
fn listed_as_approved(record: &SubmissionRecord) -> bool {
    record.status.is_none() || record.status().is_approved()
}

/// Skip writes unless upstream is newer or, lacking timestamps, different
fn needs_refresh(existing: &Tournament, mapped: &MappedSubmission) -> bool {
    if existing.ownership.is_none() {
        return true;
    }
    match (mapped.last_updated, existing.last_upstream_updated_at) {
        (Some(upstream), Some(seen)) => upstream > seen,
        (Some(_), None) => true,
        (None, _) => existing.fields.differs_from_upstream(&mapped.fields),
    }
}

fn tally(summary: &mut SyncSummary, outcome: &UpsertOutcome) {
    match outcome {
        UpsertOutcome::Created { .. } => summary.created += 1,
        UpsertOutcome::Updated { .. } => summary.updated += 1,
        UpsertOutcome::Linked { .. } => summary.linked += 1,
        UpsertOutcome::Unchanged | UpsertOutcome::Skipped { .. } => summary.skipped += 1,
    }
}
