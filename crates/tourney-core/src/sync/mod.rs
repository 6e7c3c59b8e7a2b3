//! Two-way synchronization between the submission portal and the publication store.

mod deletion;
mod error;
mod identity;
pub mod mapper;
mod portal;
mod pull;
mod push;
mod scheduler;
mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
mod webhook;

use std::sync::Arc;

pub use deletion::{ApprovedSet, DeletionDetector, DeletionReason, Verdict};
pub use error::{ErrorKind, MappingError, SyncError, SyncResult, TransportError};
pub use identity::{IdentityResolver, Resolution};
pub use portal::{HttpPortalClient, PortalSyncStatus, SubmissionPortal};
pub use pull::{PullSynchronizer, UpsertOutcome};
pub use push::{LocalWrite, PushOutcome, PushSynchronizer};
pub use scheduler::{next_delay, RunResult, SchedulerStatus, SyncScheduler};
pub use summary::{RunOutcome, SyncFailure, SyncOperation, SyncSummary};
pub use webhook::{StatusChangedEvent, TournamentDeletedEvent, WebhookHandler, WebhookOutcome};

use crate::config::EngineConfig;
use crate::services::PublicationStore;

/// Every synchronization component wired to one store and one portal
#[derive(Clone)]
pub struct SyncEngine {
    portal: Arc<dyn SubmissionPortal>,
    pull: PullSynchronizer,
    push: PushSynchronizer,
    webhooks: WebhookHandler,
    scheduler: SyncScheduler,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("SyncEngine").finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: PublicationStore,
        portal: Arc<dyn SubmissionPortal>,
        config: &EngineConfig,
    ) -> Self {
        let pull = PullSynchronizer::new(store.clone(), Arc::clone(&portal));
        let push = PushSynchronizer::new(store.clone(), Arc::clone(&portal));
        let webhooks = WebhookHandler::new(store, pull.clone());
        let scheduler = SyncScheduler::new(
            pull.clone(),
            config.interval_minutes,
            config.initial_delay,
            config.max_backoff,
        );
        Self {
            portal,
            pull,
            push,
            webhooks,
            scheduler,
        }
    }

    /// Build the engine with an HTTP portal client; `None` when sync is disabled
    pub fn from_config(
        store: PublicationStore,
        config: &EngineConfig,
    ) -> Result<Option<Self>, TransportError> {
        let Some(portal_config) = config.portal.as_ref().filter(|_| config.enabled) else {
            tracing::info!("Tournament synchronization is disabled");
            return Ok(None);
        };
        let portal: Arc<dyn SubmissionPortal> = Arc::new(HttpPortalClient::new(portal_config)?);
        Ok(Some(Self::new(store, portal, config)))
    }

    pub fn portal(&self) -> &Arc<dyn SubmissionPortal> {
        &self.portal
    }

    pub const fn pull(&self) -> &PullSynchronizer {
        &self.pull
    }

    pub const fn push(&self) -> &PushSynchronizer {
        &self.push
    }

    pub const fn webhooks(&self) -> &WebhookHandler {
        &self.webhooks
    }

    pub const fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}
