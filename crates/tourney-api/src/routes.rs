use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tourney_core::models::SyncRunRecord;
use tourney_core::services::PublicationStore;
use tourney_core::sync::{
    ErrorKind, LocalWrite, PortalSyncStatus, PushOutcome, SchedulerStatus, StatusChangedEvent,
    SyncEngine, SyncError, SyncSummary, TournamentDeletedEvent,
};
use tourney_core::util::sanitize;
use tourney_core::{Tournament, TournamentFields, TournamentId};

use crate::config::AppConfig;
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: PublicationStore,
    engine: Option<SyncEngine>,
}

impl AppState {
    pub const fn new(
        config: Arc<AppConfig>,
        store: PublicationStore,
        engine: Option<SyncEngine>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }

    fn engine(&self) -> Result<&SyncEngine, AppError> {
        self.engine
            .as_ref()
            .ok_or_else(|| SyncError::Disabled.into())
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/status", get(sync_status))
        .route("/start", post(sync_start))
        .route("/stop", post(sync_stop))
        .route("/interval", put(sync_interval))
        .route("/run", post(sync_run))
        .route("/runs", get(sync_runs))
        .route("/portal", get(portal_status));

    let tournament_routes = Router::new()
        .route("/", get(list_tournaments).post(create_tournament))
        .route(
            "/{id}",
            get(get_tournament)
                .put(edit_tournament)
                .delete(delete_tournament),
        )
        .route("/{id}/claim", post(claim_tournament))
        .route("/{id}/push", post(push_tournament));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/tournament-deleted", post(webhook_deleted))
        .route("/webhook/tournament-status-changed", post(webhook_status_changed))
        .nest("/v1/sync", sync_routes)
        .nest("/v1/tournaments", tournament_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    sync_enabled: bool,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        sync_enabled: state.engine.is_some(),
    })
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    success: bool,
    deleted: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    synced: bool,
}

async fn webhook_deleted(
    State(state): State<AppState>,
    Json(event): Json<TournamentDeletedEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    let outcome = state.engine()?.webhooks().on_deleted(&event).await?;
    Ok(Json(WebhookResponse {
        success: true,
        deleted: outcome.deleted,
        synced: outcome.synced,
    }))
}

async fn webhook_status_changed(
    State(state): State<AppState>,
    Json(event): Json<StatusChangedEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    let outcome = state.engine()?.webhooks().on_status_changed(&event).await?;
    Ok(Json(WebhookResponse {
        success: true,
        deleted: outcome.deleted,
        synced: outcome.synced,
    }))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SchedulerStatus>, AppError> {
    Ok(Json(state.engine()?.scheduler().status()))
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    /// Whether the call changed the scheduler state
    changed: bool,
    status: SchedulerStatus,
}

async fn sync_start(State(state): State<AppState>) -> Result<Json<ToggleResponse>, AppError> {
    let scheduler = state.engine()?.scheduler();
    let changed = scheduler.start();
    Ok(Json(ToggleResponse {
        changed,
        status: scheduler.status(),
    }))
}

async fn sync_stop(State(state): State<AppState>) -> Result<Json<ToggleResponse>, AppError> {
    let scheduler = state.engine()?.scheduler();
    let changed = scheduler.stop();
    Ok(Json(ToggleResponse {
        changed,
        status: scheduler.status(),
    }))
}

#[derive(Debug, Deserialize)]
struct IntervalRequest {
    minutes: u64,
}

async fn sync_interval(
    State(state): State<AppState>,
    Json(request): Json<IntervalRequest>,
) -> Result<Json<SchedulerStatus>, AppError> {
    let scheduler = state.engine()?.scheduler();
    scheduler.set_interval(request.minutes)?;
    Ok(Json(scheduler.status()))
}

async fn sync_run(State(state): State<AppState>) -> Result<Json<SyncSummary>, AppError> {
    let summary = state.engine()?.scheduler().run_now().await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

async fn sync_runs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<SyncRunRecord>>, AppError> {
    Ok(Json(state.store.list_sync_runs(query.limit()).await?))
}

#[derive(Debug, Serialize)]
struct PortalResponse {
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<PortalSyncStatus>,
}

async fn portal_status(State(state): State<AppState>) -> Result<Json<PortalResponse>, AppError> {
    let portal = state.engine()?.portal();
    let (healthy, error) = match portal.health().await {
        Ok(()) => (true, None),
        Err(error) => (false, Some(sanitize(&error))),
    };
    let counts = match portal.sync_status().await {
        Ok(counts) => Some(counts),
        Err(error) => {
            tracing::warn!(kind = %error.kind(), "Portal sync status unavailable: {}", sanitize(&error));
            None
        }
    };
    Ok(Json(PortalResponse {
        healthy,
        error,
        counts,
    }))
}

async fn list_tournaments(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Tournament>>, AppError> {
    let tournaments = state
        .store
        .list(query.limit(), query.offset.unwrap_or_default())
        .await?;
    Ok(Json(tournaments))
}

async fn get_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tournament>, AppError> {
    let id = parse_id(&id)?;
    let tournament = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("tournament {id}")))?;
    Ok(Json(tournament))
}

/// Push result reported next to a committed local write
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PushReport {
    Done(PushOutcome),
    Failed { error: String, kind: ErrorKind },
    Deferred { outcome: &'static str },
}

#[derive(Debug, Serialize)]
struct LocalWriteResponse {
    tournament: Tournament,
    push: PushReport,
}

impl From<LocalWrite> for LocalWriteResponse {
    fn from(write: LocalWrite) -> Self {
        let push = match write.push {
            Ok(outcome) => PushReport::Done(outcome),
            Err(error) => PushReport::Failed {
                error: sanitize(&error),
                kind: error.kind(),
            },
        };
        Self {
            tournament: write.tournament,
            push,
        }
    }
}

impl LocalWriteResponse {
    /// Local write committed while sync is off; pushed on a later trigger
    fn deferred(tournament: Tournament) -> Self {
        Self {
            tournament,
            push: PushReport::Deferred {
                outcome: "sync_disabled",
            },
        }
    }
}

async fn create_tournament(
    State(state): State<AppState>,
    Json(fields): Json<TournamentFields>,
) -> Result<(StatusCode, Json<LocalWriteResponse>), AppError> {
    let response = match &state.engine {
        Some(engine) => engine.push().create_local(&fields).await?.into(),
        None => LocalWriteResponse::deferred(state.store.create_local(&fields).await?),
    };
    tracing::info!(tournament_id = %response.tournament.id, "Created local tournament");
    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize)]
struct EditRequest {
    version: i64,
    #[serde(flatten)]
    fields: TournamentFields,
}

async fn edit_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EditRequest>,
) -> Result<Json<LocalWriteResponse>, AppError> {
    let id = parse_id(&id)?;
    let response = match &state.engine {
        Some(engine) => engine
            .push()
            .edit_local(&id, request.version, &request.fields)
            .await?
            .into(),
        None => LocalWriteResponse::deferred(
            state
                .store
                .update_local(&id, request.version, &request.fields)
                .await?,
        ),
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct VersionRequest {
    version: i64,
}

async fn delete_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<VersionRequest>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state.engine()?.push().delete_local(&id, query.version).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn claim_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<VersionRequest>,
) -> Result<Json<Tournament>, AppError> {
    let id = parse_id(&id)?;
    let tournament = state.engine()?.push().claim(&id, request.version).await?;
    Ok(Json(tournament))
}

async fn push_tournament(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PushOutcome>, AppError> {
    let id = parse_id(&id)?;
    let outcome = state.engine()?.push().push(&id).await?;
    Ok(Json(outcome))
}

fn parse_id(raw: &str) -> Result<TournamentId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid tournament id: {raw}")))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tourney_core::config::EngineConfig;
    use tourney_core::sync::testing::{submission, FakePortal};
    use tourney_core::models::ApplicationId;
    use tower::ServiceExt;

    use super::*;

    struct Harness {
        router: Router,
        store: PublicationStore,
        portal: Arc<FakePortal>,
    }

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            database_path: ":memory:".to_string(),
            engine: EngineConfig::disabled(),
        })
    }

    async fn harness() -> Harness {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let portal = Arc::new(FakePortal::new());
        let engine = SyncEngine::new(store.clone(), portal.clone(), &EngineConfig::disabled());
        let router = app_router(AppState::new(test_config(), store.clone(), Some(engine)));
        Harness {
            router,
            store,
            portal,
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn healthz_reports_sync_state() {
        let harness = harness().await;
        let (status, body) = call(&harness.router, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sync_enabled"], true);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn webhooks_answer_503_when_sync_disabled() {
        let store = PublicationStore::open_in_memory().await.unwrap();
        let router = app_router(AppState::new(test_config(), store, None));

        let (status, body) = call(
            &router,
            Method::POST,
            "/webhook/tournament-deleted",
            Some(json!({"applicationId": "A1"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service unavailable: Synchronization is disabled");

        let (status, _) = call(&router, Method::POST, "/v1/sync/run", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_webhook_removes_row_and_is_idempotent() {
        let harness = harness().await;
        let row = harness
            .store
            .insert_linked(
                &TournamentFields::new("KL Open", "2025-01-15".parse().unwrap()),
                &ApplicationId::parse("A1").unwrap(),
                None,
            )
            .await
            .unwrap();
        let payload = json!({
            "applicationId": "A1",
            "eventTitle": "KL Open",
            "timestamp": "2025-01-20T10:00:00Z"
        });

        let (status, body) = call(
            &harness.router,
            Method::POST,
            "/webhook/tournament-deleted",
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "deleted": true}));
        assert!(harness.store.get(&row.id).await.unwrap().is_none());

        let (status, body) = call(
            &harness.router,
            Method::POST,
            "/webhook/tournament-deleted",
            Some(payload),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "deleted": false}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn approved_status_webhook_pulls_single_record() {
        let harness = harness().await;
        harness
            .portal
            .put(submission("A3", "Penang Open", "2025-04-01", "Approved"));

        let (status, body) = call(
            &harness.router,
            Method::POST,
            "/webhook/tournament-status-changed",
            Some(json!({
                "applicationId": "A3",
                "eventTitle": "Penang Open",
                "oldStatus": "Pending",
                "newStatus": "Approved",
                "timestamp": "2025-03-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["synced"], true);
        assert!(harness
            .store
            .find_by_cross_ref(&ApplicationId::parse("A3").unwrap())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_run_then_list() {
        let harness = harness().await;
        harness
            .portal
            .put(submission("A1", "KL Open", "2025-01-15", "Approved"));

        let (status, summary) = call(&harness.router, Method::POST, "/v1/sync/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], 1);

        let (status, rows) = call(&harness.router, Method::GET, "/v1/tournaments?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows[0]["name"], "KL Open");
        assert_eq!(rows[0]["cross_ref_id"], "A1");
        assert_eq!(rows[0]["ownership"], "submission-owned");

        let (status, runs) = call(&harness.router, Method::GET, "/v1/sync/runs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(runs.as_array().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_controls_round_trip() {
        let harness = harness().await;

        let (status, body) = call(&harness.router, Method::POST, "/v1/sync/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(body["status"]["running"], true);

        let (_, body) = call(&harness.router, Method::POST, "/v1/sync/start", None).await;
        assert_eq!(body["changed"], false);

        let (status, _) = call(
            &harness.router,
            Method::PUT,
            "/v1/sync/interval",
            Some(json!({"minutes": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &harness.router,
            Method::PUT,
            "/v1/sync/interval",
            Some(json!({"minutes": 30})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["interval_minutes"], 30);

        let (_, body) = call(&harness.router, Method::POST, "/v1/sync/stop", None).await;
        assert_eq!(body["changed"], true);
        assert_eq!(body["status"]["running"], false);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_create_pushes_and_mirrored_edit_needs_claim() {
        let harness = harness().await;

        let (status, body) = call(
            &harness.router,
            Method::POST,
            "/v1/tournaments",
            Some(json!({"name": "Shah Alam Cup", "start_date": "2025-03-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["push"]["outcome"], "created");
        assert_eq!(body["tournament"]["cross_ref_id"], "A1");
        assert_eq!(body["tournament"]["ownership"], "submission-owned");

        let id = body["tournament"]["id"].as_str().unwrap().to_string();
        let version = body["tournament"]["version"].as_i64().unwrap();
        let edit = json!({"version": version, "name": "Shah Alam Cup", "start_date": "2025-03-02"});

        let (status, _) = call(
            &harness.router,
            Method::PUT,
            &format!("/v1/tournaments/{id}"),
            Some(edit),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, claimed) = call(
            &harness.router,
            Method::POST,
            &format!("/v1/tournaments/{id}/claim"),
            Some(json!({"version": version})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claimed["ownership"], "local");

        let claimed_version = claimed["version"].as_i64().unwrap();
        let (status, _) = call(
            &harness.router,
            Method::DELETE,
            &format!("/v1/tournaments/{id}?version={claimed_version}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(harness.portal.application("A1").is_none());

        let (status, _) = call(&harness.router, Method::GET, &format!("/v1/tournaments/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_tournament_id_is_rejected() {
        let harness = harness().await;
        let (status, body) = call(&harness.router, Method::POST, "/v1/tournaments/nope/push", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }
}
