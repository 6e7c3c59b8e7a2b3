//! Instant handlers for submission-store events.
//!
//! These only shorten convergence; a lost event is repaired by the next pull.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::deletion::{log_deletion, DeletionReason};
use super::error::SyncResult;
use super::identity::IdentityResolver;
use super::mapper::parse_date;
use super::pull::{PullSynchronizer, UpsertOutcome};
use crate::models::{ApplicationId, SubmissionStatus};
use crate::services::PublicationStore;
use crate::Error;

/// Delete attempts before giving up on a row that keeps changing underneath
const MAX_DELETE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentDeletedEvent {
    pub application_id: ApplicationId,
    #[serde(default)]
    pub event_title: Option<String>,
    /// Narrows the name fallback to one edition when present
    #[serde(default)]
    pub event_start_date: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedEvent {
    pub application_id: ApplicationId,
    #[serde(default)]
    pub event_title: Option<String>,
    /// Narrows the name fallback to one edition when present
    #[serde(default)]
    pub event_start_date: Option<String>,
    #[serde(default)]
    pub old_status: Option<String>,
    pub new_status: SubmissionStatus,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    /// A publication row was removed
    pub deleted: bool,
    /// A publication row was created or refreshed
    pub synced: bool,
}

#[derive(Clone)]
pub struct WebhookHandler {
    store: PublicationStore,
    resolver: IdentityResolver,
    pull: PullSynchronizer,
}

impl WebhookHandler {
    pub fn new(store: PublicationStore, pull: PullSynchronizer) -> Self {
        Self {
            resolver: IdentityResolver::new(store.clone()),
            store,
            pull,
        }
    }

    /// Upstream application deleted. Absent rows are a success.
    pub async fn on_deleted(&self, event: &TournamentDeletedEvent) -> SyncResult<WebhookOutcome> {
        tracing::info!(
            application_id = %event.application_id,
            "Received tournament-deleted event"
        );
        let deleted = self
            .remove(
                &event.application_id,
                event.event_title.as_deref(),
                edition(event.event_start_date.as_deref()),
                DeletionReason::WebhookDeleted,
            )
            .await?;
        Ok(WebhookOutcome {
            deleted,
            synced: false,
        })
    }

    /// Approval pulls the single record; any other status removes it
    pub async fn on_status_changed(&self, event: &StatusChangedEvent) -> SyncResult<WebhookOutcome> {
        tracing::info!(
            application_id = %event.application_id,
            old_status = event.old_status.as_deref().unwrap_or_default(),
            new_status = %event.new_status,
            "Received tournament-status-changed event"
        );

        if event.new_status.is_approved() {
            let outcome = self.pull.sync_one(&event.application_id).await?;
            return Ok(WebhookOutcome {
                deleted: false,
                synced: !matches!(outcome, UpsertOutcome::Skipped { .. }),
            });
        }

        let deleted = self
            .remove(
                &event.application_id,
                event.event_title.as_deref(),
                edition(event.event_start_date.as_deref()),
                DeletionReason::WebhookStatusChanged(event.new_status.clone()),
            )
            .await?;
        Ok(WebhookOutcome {
            deleted,
            synced: false,
        })
    }

    async fn remove(
        &self,
        application_id: &ApplicationId,
        name: Option<&str>,
        start_date: Option<NaiveDate>,
        reason: DeletionReason,
    ) -> SyncResult<bool> {
        let mut attempt = 1;
        loop {
            let Some(tournament) = self
                .resolver
                .resolve_for_removal(application_id, name, start_date)
                .await?
                .into_tournament()
            else {
                tracing::debug!(application_id = %application_id, "No publication row to remove");
                return Ok(false);
            };

            match self.store.delete(&tournament, reason.as_str()).await {
                Ok(()) => {
                    log_deletion(&tournament, &reason);
                    return Ok(true);
                }
                Err(Error::NotFound(_)) => return Ok(false),
                Err(error) if error.is_conflict() && attempt < MAX_DELETE_ATTEMPTS => {
                    tracing::debug!(
                        tournament_id = %tournament.id,
                        attempt,
                        "Row changed during webhook delete; re-reading"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

fn edition(start_date: Option<&str>) -> Option<NaiveDate> {
    start_date.and_then(parse_date)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Ownership, TournamentFields};
    use crate::sync::testing::{submission, FakePortal};
    use pretty_assertions::assert_eq;

    async fn setup() -> (PublicationStore, Arc<FakePortal>, WebhookHandler) {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let portal = Arc::new(FakePortal::new());
        let pull = PullSynchronizer::new(store.clone(), portal.clone());
        let handler = WebhookHandler::new(store.clone(), pull);
        (store, portal, handler)
    }

    fn app(id: &str) -> ApplicationId {
        ApplicationId::parse(id).unwrap()
    }

    fn deleted_event(id: &str, title: Option<&str>) -> TournamentDeletedEvent {
        TournamentDeletedEvent {
            application_id: app(id),
            event_title: title.map(str::to_string),
            event_start_date: None,
            timestamp: None,
        }
    }

    #[test]
    fn events_decode_from_camel_case() {
        let event: StatusChangedEvent = serde_json::from_str(
            r#"{"applicationId": 12, "eventTitle": "KL Open", "oldStatus": "Approved",
                "newStatus": "Cancelled", "timestamp": "2025-01-20T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.application_id, app("12"));
        assert_eq!(event.new_status, SubmissionStatus::Cancelled);
        assert_eq!(event.event_start_date, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dated_event_only_removes_matching_edition() {
        let (store, _portal, handler) = setup().await;
        let mut editions = Vec::new();
        for start in ["2024-03-01", "2025-03-01"] {
            let row = store
                .create_local(&TournamentFields::new("Johor Cup", start.parse().unwrap()))
                .await
                .unwrap();
            let row = store
                .transfer_ownership(&row.id, row.version, Ownership::SubmissionOwned)
                .await
                .unwrap();
            editions.push(row);
        }

        let event: TournamentDeletedEvent = serde_json::from_str(
            r#"{"applicationId": "A77", "eventTitle": "Johor Cup", "eventStartDate": "2025-03-01"}"#,
        )
        .unwrap();
        let outcome = handler.on_deleted(&event).await.unwrap();
        assert!(outcome.deleted);
        assert!(store.get(&editions[0].id).await.unwrap().is_some());
        assert!(store.get(&editions[1].id).await.unwrap().is_none());

        let again = handler.on_deleted(&event).await.unwrap();
        assert!(!again.deleted);
        assert!(store.get(&editions[0].id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_event_removes_linked_row_immediately() {
        let (store, _portal, handler) = setup().await;
        let row = store
            .insert_linked(
                &TournamentFields::new("KL Open", "2025-01-15".parse().unwrap()),
                &app("A1"),
                None,
            )
            .await
            .unwrap();

        let outcome = handler
            .on_deleted(&deleted_event("A1", Some("KL Open")))
            .await
            .unwrap();
        assert!(outcome.deleted);
        assert!(store.get(&row.id).await.unwrap().is_none());

        // Redelivery is a success with nothing left to delete
        let again = handler
            .on_deleted(&deleted_event("A1", Some("KL Open")))
            .await
            .unwrap();
        assert_eq!(again, WebhookOutcome::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_event_falls_back_to_name_but_spares_local_rows() {
        let (store, _portal, handler) = setup().await;
        let local = store
            .create_local(&TournamentFields::new("Ipoh Open", "2025-02-01".parse().unwrap()))
            .await
            .unwrap();
        let legacy = store
            .create_local(&TournamentFields::new("Johor Cup", "2025-03-01".parse().unwrap()))
            .await
            .unwrap();
        store
            .transfer_ownership(&legacy.id, legacy.version, Ownership::SubmissionOwned)
            .await
            .unwrap();

        let spared = handler
            .on_deleted(&deleted_event("A40", Some("Ipoh Open")))
            .await
            .unwrap();
        assert!(!spared.deleted);
        assert!(store.get(&local.id).await.unwrap().is_some());

        let removed = handler
            .on_deleted(&deleted_event("A41", Some("johor cup")))
            .await
            .unwrap();
        assert!(removed.deleted);
        assert!(store.get(&legacy.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_changes_pull_or_remove_single_record() {
        let (store, portal, handler) = setup().await;
        portal.put(submission("A5", "Melaka Open", "2025-05-01", "Approved"));

        let approved = StatusChangedEvent {
            application_id: app("A5"),
            event_title: Some("Melaka Open".to_string()),
            event_start_date: None,
            old_status: Some("Under Review".to_string()),
            new_status: SubmissionStatus::Approved,
            timestamp: None,
        };
        let outcome = handler.on_status_changed(&approved).await.unwrap();
        assert!(outcome.synced);
        assert!(store.find_by_cross_ref(&app("A5")).await.unwrap().is_some());
        assert_eq!(portal.call_count("list_approved"), 0);

        let cancelled = StatusChangedEvent {
            new_status: SubmissionStatus::Cancelled,
            old_status: Some("Approved".to_string()),
            ..approved
        };
        let outcome = handler.on_status_changed(&cancelled).await.unwrap();
        assert!(outcome.deleted);
        assert!(store.find_by_cross_ref(&app("A5")).await.unwrap().is_none());

        let deletions = store.list_deletions(1).await.unwrap();
        assert_eq!(deletions[0].reason, "webhook_status_changed");
    }
}
