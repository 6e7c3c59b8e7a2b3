//! Push synchronization: publication store into submission store.
//!
//! Push is triggered by local mutation, never by the timer. Work on one record
//! is serialized through a per-record lock so a create cannot race an update
//! and produce two upstream applications.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::deletion::{log_deletion, DeletionReason};
use super::error::{SyncError, SyncResult, TransportError};
use super::mapper;
use super::portal::SubmissionPortal;
use crate::models::{ApplicationId, Ownership, Tournament, TournamentFields, TournamentId};
use crate::services::PublicationStore;
use crate::util::sanitize;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    /// Upstream application created and the row linked to it
    Created { tournament: Tournament },
    Updated { tournament: Tournament },
    Skipped { reason: &'static str },
    /// Update found the upstream application gone; the row was removed
    RemovedUpstreamMissing,
}

/// Result of a local mutation together with its push attempt.
///
/// The local write is committed even when the push fails; the row stays
/// `local` and is pushed again on its next mutation or a manual push.
#[derive(Debug)]
pub struct LocalWrite {
    pub tournament: Tournament,
    pub push: SyncResult<PushOutcome>,
}

#[derive(Default)]
struct RecordLocks {
    inner: std::sync::Mutex<HashMap<TournamentId, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: TournamentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody is holding or waiting on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct PushSynchronizer {
    store: PublicationStore,
    portal: Arc<dyn SubmissionPortal>,
    locks: Arc<RecordLocks>,
}

impl PushSynchronizer {
    pub fn new(store: PublicationStore, portal: Arc<dyn SubmissionPortal>) -> Self {
        Self {
            store,
            portal,
            locks: Arc::new(RecordLocks::default()),
        }
    }

    /// Create a local tournament and push it upstream
    pub async fn create_local(&self, fields: &TournamentFields) -> SyncResult<LocalWrite> {
        let tournament = self.store.create_local(fields).await?;
        let _guard = self.locks.acquire(tournament.id).await;
        Ok(self.push_write(tournament).await)
    }

    /// Apply a versioned local edit, then push it
    pub async fn edit_local(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
    ) -> SyncResult<LocalWrite> {
        let _guard = self.locks.acquire(*id).await;
        let tournament = self
            .store
            .update_local(id, expected_version, fields)
            .await?;
        Ok(self.push_write(tournament).await)
    }

    /// Push the current state of one record
    pub async fn push(&self, id: &TournamentId) -> SyncResult<PushOutcome> {
        let _guard = self.locks.acquire(*id).await;
        let tournament = self.require(id).await?;
        self.push_locked(&tournament).await
    }

    /// Take ownership of a mirrored record so it can be edited locally
    pub async fn claim(&self, id: &TournamentId, expected_version: i64) -> SyncResult<Tournament> {
        let _guard = self.locks.acquire(*id).await;
        let tournament = self.require(id).await?;
        if tournament.is_local() && tournament.version == expected_version {
            return Ok(tournament);
        }
        let claimed = self
            .store
            .transfer_ownership(id, expected_version, Ownership::Local)
            .await?;
        tracing::info!(
            tournament_id = %id,
            application_id = claimed.cross_ref_id.as_ref().map(ApplicationId::as_str).unwrap_or_default(),
            "Ownership transferred to the publication side"
        );
        Ok(claimed)
    }

    /// Delete a record on behalf of its owning user, upstream first
    pub async fn delete_local(&self, id: &TournamentId, expected_version: i64) -> SyncResult<()> {
        let _guard = self.locks.acquire(*id).await;
        let tournament = self.require(id).await?;
        if tournament.is_submission_owned() {
            return Err(Error::OwnershipViolation(format!(
                "tournament {id} is owned by the submission store; transfer ownership before deleting"
            ))
            .into());
        }
        if tournament.version != expected_version {
            return Err(Error::Conflict {
                id: id.to_string(),
                expected: expected_version,
                actual: tournament.version,
            }
            .into());
        }

        if let Some(application_id) = &tournament.cross_ref_id {
            match self.portal.delete_application(application_id).await {
                Ok(()) => {}
                Err(TransportError::NotFound(_)) => tracing::debug!(
                    application_id = %application_id,
                    "Upstream application already absent"
                ),
                Err(error) => return Err(error.into()),
            }
        }

        let reason = DeletionReason::OwnerDeleted;
        self.store.delete(&tournament, reason.as_str()).await?;
        log_deletion(&tournament, &reason);
        Ok(())
    }

    async fn require(&self, id: &TournamentId) -> SyncResult<Tournament> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()).into())
    }

    async fn push_write(&self, tournament: Tournament) -> LocalWrite {
        let push = self.push_locked(&tournament).await;
        let tournament = match &push {
            Ok(PushOutcome::Created { tournament } | PushOutcome::Updated { tournament }) => {
                tournament.clone()
            }
            _ => tournament,
        };
        LocalWrite { tournament, push }
    }

    /// Caller must hold the record lock
    async fn push_locked(&self, tournament: &Tournament) -> SyncResult<PushOutcome> {
        if !tournament.is_local() {
            return Ok(PushOutcome::Skipped { reason: "not_local" });
        }

        let body = mapper::to_submission(&tournament.fields);
        let result = match &tournament.cross_ref_id {
            None => match self.portal.create_application(&body).await {
                Ok(application_id) => self.link_created(tournament, &application_id).await,
                Err(error) => Err(error.into()),
            },
            Some(application_id) => match self.portal.update_application(application_id, &body).await {
                Ok(()) => self
                    .store
                    .mark_synced(&tournament.id, tournament.version, application_id)
                    .await
                    .map(|tournament| PushOutcome::Updated { tournament })
                    .map_err(SyncError::from),
                Err(TransportError::NotFound(_)) => {
                    // Upstream gone: remove locally rather than re-create it
                    let reason = DeletionReason::UpstreamMissingOnPush;
                    self.store.delete(tournament, reason.as_str()).await?;
                    log_deletion(tournament, &reason);
                    Ok(PushOutcome::RemovedUpstreamMissing)
                }
                Err(error) => Err(error.into()),
            },
        };

        match &result {
            Ok(outcome) => tracing::info!(tournament_id = %tournament.id, ?outcome, "Push completed"),
            Err(error) => tracing::warn!(
                tournament_id = %tournament.id,
                kind = %error.kind(),
                "Push failed; record stays local: {}",
                sanitize(error)
            ),
        }
        result
    }

    async fn link_created(
        &self,
        tournament: &Tournament,
        application_id: &ApplicationId,
    ) -> SyncResult<PushOutcome> {
        match self
            .store
            .mark_synced(&tournament.id, tournament.version, application_id)
            .await
        {
            Ok(tournament) => Ok(PushOutcome::Created { tournament }),
            Err(error) if error.is_conflict() => {
                // A pull linked or touched the row meanwhile; retry once if still unlinked
                let current = self.require(&tournament.id).await?;
                if current.cross_ref_id.as_ref() == Some(application_id) {
                    return Ok(PushOutcome::Created { tournament: current });
                }
                if current.cross_ref_id.is_some() {
                    tracing::warn!(
                        tournament_id = %tournament.id,
                        application_id = %application_id,
                        "Row was linked elsewhere while creating upstream; created application is orphaned"
                    );
                    return Err(error.into());
                }
                let tournament = self
                    .store
                    .mark_synced(&current.id, current.version, application_id)
                    .await?;
                Ok(PushOutcome::Created { tournament })
            }
            Err(error) => Err(error.into()),
        }
    }
}
