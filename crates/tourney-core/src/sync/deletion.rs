//! Deletion detection.
//!
//! A row is never removed only because it was missing from one batch fetch.
//! Removal needs a confirmed non-approved status for a known id, a confirmed
//! absence for a known id, or (for unlinked rows) absence from both the
//! approved set and a name search.

use std::collections::HashSet;
use std::sync::Arc;

use super::error::{SyncError, SyncResult, TransportError};
use super::portal::SubmissionPortal;
use super::summary::{SyncOperation, SyncSummary};
use crate::models::{ApplicationId, SubmissionRecord, SubmissionStatus, Tournament};
use crate::services::PublicationStore;
use crate::util::name_key;

/// Why a tournament was removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionReason {
    /// Direct lookup returned a non-approved status
    NotApproved(SubmissionStatus),
    /// Direct lookup returned 404
    ConfirmedAbsent,
    /// Unlinked row with no approved submission of the same name
    OrphanNotFoundByName,
    /// Push update found the upstream record gone
    UpstreamMissingOnPush,
    WebhookDeleted,
    WebhookStatusChanged(SubmissionStatus),
    /// Deleted by its owning user
    OwnerDeleted,
}

impl DeletionReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotApproved(_) => "not_approved",
            Self::ConfirmedAbsent => "confirmed_absent",
            Self::OrphanNotFoundByName => "orphan_not_found_by_name",
            Self::UpstreamMissingOnPush => "upstream_missing_on_push",
            Self::WebhookDeleted => "webhook_deleted",
            Self::WebhookStatusChanged(_) => "webhook_status_changed",
            Self::OwnerDeleted => "owner_deleted",
        }
    }
}

impl std::fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotApproved(status) | Self::WebhookStatusChanged(status) => {
                write!(f, "{} ({status})", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// The just-fetched approved set, indexed for membership checks
#[derive(Debug, Clone, Default)]
pub struct ApprovedSet {
    ids: HashSet<ApplicationId>,
    names: HashSet<String>,
}

impl ApprovedSet {
    /// Index every record, including ones the mapper will reject, so a
    /// mapping bug never turns into a deletion.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a SubmissionRecord>) -> Self {
        let mut set = Self::default();
        for record in records {
            set.insert(record);
        }
        set
    }

    pub fn insert(&mut self, record: &SubmissionRecord) {
        if let Some(id) = record.application_id() {
            self.ids.insert(id);
        }
        if let Some(title) = record.event_title.as_deref() {
            self.names.insert(name_key(title));
        }
    }

    pub fn contains_id(&self, id: &ApplicationId) -> bool {
        self.ids.contains(id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Delete(DeletionReason),
}

#[derive(Clone)]
pub struct DeletionDetector {
    store: PublicationStore,
    portal: Arc<dyn SubmissionPortal>,
}

impl DeletionDetector {
    pub fn new(store: PublicationStore, portal: Arc<dyn SubmissionPortal>) -> Self {
        Self { store, portal }
    }

    /// Check every sync candidate against `approved`, deleting confirmed drift.
    ///
    /// Failures are recorded in `summary` and never abort the pass.
    pub async fn detect(&self, approved: &ApprovedSet, summary: &mut SyncSummary) {
        let candidates = match self.store.list_sync_candidates().await {
            Ok(candidates) => candidates,
            Err(error) => {
                summary.record_failure(
                    SyncOperation::DetectDeletion,
                    None,
                    None,
                    &SyncError::from(error),
                );
                return;
            }
        };

        for tournament in candidates {
            let application_id = tournament.cross_ref_id.as_ref().map(ApplicationId::as_str);
            match self.check(&tournament, approved).await {
                Ok(Verdict::Keep) => {}
                Ok(Verdict::Delete(reason)) => {
                    match self.store.delete(&tournament, reason.as_str()).await {
                        Ok(()) => {
                            summary.deleted += 1;
                            log_deletion(&tournament, &reason);
                        }
                        Err(error) => summary.record_failure(
                            SyncOperation::Delete,
                            application_id,
                            Some(tournament.id.to_string()),
                            &SyncError::from(error),
                        ),
                    }
                }
                Err(error) => summary.record_failure(
                    SyncOperation::DetectDeletion,
                    application_id,
                    Some(tournament.id.to_string()),
                    &error,
                ),
            }
        }
    }

    /// Decide whether one candidate row is still backed by upstream
    pub async fn check(&self, tournament: &Tournament, approved: &ApprovedSet) -> SyncResult<Verdict> {
        match &tournament.cross_ref_id {
            Some(id) => self.check_linked(id, approved).await,
            None => self.check_unlinked(tournament, approved).await,
        }
    }

    async fn check_linked(&self, id: &ApplicationId, approved: &ApprovedSet) -> SyncResult<Verdict> {
        if approved.contains_id(id) {
            return Ok(Verdict::Keep);
        }

        match self.portal.get_application(id).await {
            Ok(record) => {
                let status = record.status();
                if status.is_approved() {
                    tracing::debug!(
                        application_id = %id,
                        "Missing from the approved batch but still approved upstream; keeping"
                    );
                    Ok(Verdict::Keep)
                } else {
                    Ok(Verdict::Delete(DeletionReason::NotApproved(status)))
                }
            }
            Err(TransportError::NotFound(_)) => Ok(Verdict::Delete(DeletionReason::ConfirmedAbsent)),
            Err(source) => Err(SyncError::ConfirmationFailed {
                target: id.to_string(),
                source,
            }),
        }
    }

    async fn check_unlinked(
        &self,
        tournament: &Tournament,
        approved: &ApprovedSet,
    ) -> SyncResult<Verdict> {
        let name = &tournament.fields.name;
        if approved.contains_name(name) {
            return Ok(Verdict::Keep);
        }

        let key = name_key(name);
        let matches = self
            .portal
            .search_applications(name)
            .await
            .map_err(|source| SyncError::ConfirmationFailed {
                target: name.clone(),
                source,
            })?;
        let still_approved = matches.iter().any(|record| {
            record.status().is_approved()
                && record.event_title.as_deref().map(name_key).as_ref() == Some(&key)
        });

        if still_approved {
            Ok(Verdict::Keep)
        } else {
            Ok(Verdict::Delete(DeletionReason::OrphanNotFoundByName))
        }
    }
}

pub(crate) fn log_deletion(tournament: &Tournament, reason: &DeletionReason) {
    tracing::info!(
        tournament_id = %tournament.id,
        application_id = tournament.cross_ref_id.as_ref().map(ApplicationId::as_str).unwrap_or_default(),
        reason = reason.as_str(),
        "Deleted tournament {:?}: {reason}",
        tournament.fields.name
    );
}
