//! Outbound client for the submission portal API.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransportError;
use crate::config::PortalConfig;
use crate::models::{ApplicationId, SubmissionFields, SubmissionRecord};
use crate::util::{compact_text, is_http_url, normalize_text_option, sanitize};

/// Counts reported by `GET /sync/status`, passed through as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortalSyncStatus(pub BTreeMap<String, Value>);

/// Operations the engine needs from the submission store.
///
/// Implementations classify every failure and never retry.
#[async_trait]
pub trait SubmissionPortal: Send + Sync {
    /// Full set of currently approved submissions
    async fn list_approved(&self) -> Result<Vec<SubmissionRecord>, TransportError>;

    /// Direct lookup of one submission, whatever its status
    async fn get_application(&self, id: &ApplicationId)
        -> Result<SubmissionRecord, TransportError>;

    /// Submissions whose title matches, whatever their status
    async fn search_applications(&self, title: &str)
        -> Result<Vec<SubmissionRecord>, TransportError>;

    async fn create_application(
        &self,
        fields: &SubmissionFields,
    ) -> Result<ApplicationId, TransportError>;

    async fn update_application(
        &self,
        id: &ApplicationId,
        fields: &SubmissionFields,
    ) -> Result<(), TransportError>;

    async fn delete_application(&self, id: &ApplicationId) -> Result<(), TransportError>;

    async fn health(&self) -> Result<(), TransportError>;

    async fn sync_status(&self) -> Result<PortalSyncStatus, TransportError>;
}

/// `reqwest`-backed portal client
#[derive(Clone)]
pub struct HttpPortalClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl fmt::Debug for HttpPortalClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpPortalClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpPortalClient {
    pub fn new(config: &PortalConfig) -> Result<Self, TransportError> {
        Self::from_parts(&config.base_url, config.token.clone(), config.timeout)
    }

    pub fn from_parts(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::InvalidConfiguration(sanitize(&error)))?;

        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, TransportError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after, &body, resource))
    }

    async fn read_json(response: Response) -> Result<Value, TransportError> {
        let text = response.text().await.map_err(classify_send_error)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| {
            TransportError::InvalidPayload(format!("{error}: {}", compact_text(&text)))
        })
    }
}

#[async_trait]
impl SubmissionPortal for HttpPortalClient {
    async fn list_approved(&self) -> Result<Vec<SubmissionRecord>, TransportError> {
        let response = self
            .send(self.client.get(self.url("/approved-tournaments")), "approved-tournaments")
            .await?;
        records_from_list(Self::read_json(response).await?)
    }

    async fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<SubmissionRecord, TransportError> {
        let path = format!("/applications/{}", urlencoding::encode(id.as_str()));
        let response = self
            .send(self.client.get(self.url(&path)), id.as_str())
            .await?;
        let payload = unwrap_data(Self::read_json(response).await?);
        if !payload.is_object() {
            return Err(TransportError::InvalidPayload(format!(
                "expected an application object for {id}"
            )));
        }
        serde_json::from_value(payload)
            .map_err(|error| TransportError::InvalidPayload(error.to_string()))
    }

    async fn search_applications(
        &self,
        title: &str,
    ) -> Result<Vec<SubmissionRecord>, TransportError> {
        let response = self
            .send(
                self.client
                    .get(self.url("/applications"))
                    .query(&[("eventTitle", title)]),
                title,
            )
            .await?;
        records_from_list(Self::read_json(response).await?)
    }

    async fn create_application(
        &self,
        fields: &SubmissionFields,
    ) -> Result<ApplicationId, TransportError> {
        let response = self
            .send(
                self.client.post(self.url("/applications")).json(fields),
                &fields.event_title,
            )
            .await?;
        let payload = unwrap_data(Self::read_json(response).await?);
        ["applicationId", "application_id", "id"]
            .iter()
            .find_map(|key| match payload.get(key) {
                Some(Value::String(text)) => ApplicationId::parse(text),
                Some(Value::Number(number)) => ApplicationId::parse(number.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                TransportError::InvalidPayload(
                    "create response did not include applicationId".to_string(),
                )
            })
    }

    async fn update_application(
        &self,
        id: &ApplicationId,
        fields: &SubmissionFields,
    ) -> Result<(), TransportError> {
        let path = format!(
            "/sync/tournament/update/{}",
            urlencoding::encode(id.as_str())
        );
        self.send(self.client.put(self.url(&path)).json(fields), id.as_str())
            .await?;
        Ok(())
    }

    async fn delete_application(&self, id: &ApplicationId) -> Result<(), TransportError> {
        let path = format!("/sync/tournament/{}", urlencoding::encode(id.as_str()));
        self.send(self.client.delete(self.url(&path)), id.as_str())
            .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), TransportError> {
        let response = self.send(self.client.get(self.url("/health")), "health").await?;
        let payload = Self::read_json(response).await?;
        match payload.get("status").and_then(Value::as_str) {
            Some(status) if status.eq_ignore_ascii_case("ok") => Ok(()),
            other => Err(TransportError::InvalidPayload(format!(
                "portal health reported {}",
                other.unwrap_or("no status")
            ))),
        }
    }

    async fn sync_status(&self) -> Result<PortalSyncStatus, TransportError> {
        let response = self
            .send(self.client.get(self.url("/sync/status")), "sync/status")
            .await?;
        match unwrap_data(Self::read_json(response).await?) {
            Value::Object(map) => Ok(PortalSyncStatus(map.into_iter().collect())),
            _ => Err(TransportError::InvalidPayload(
                "sync status response was not an object".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PortalErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PortalErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    resource: &str,
) -> TransportError {
    match status {
        StatusCode::NOT_FOUND => TransportError::NotFound(resource.to_string()),
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited { retry_after },
        status if status.is_server_error() => TransportError::RemoteFault {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
        status => TransportError::Rejected {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

fn classify_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::InvalidPayload(sanitize(&error))
    } else if error.is_builder() {
        TransportError::InvalidConfiguration(sanitize(&error))
    } else {
        TransportError::Unreachable(sanitize(&error))
    }
}

/// `Retry-After` as delta-seconds or an HTTP date
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

fn unwrap_data(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

/// Accept a bare array or one wrapped in `data` / `tournaments`
fn records_from_list(payload: Value) -> Result<Vec<SubmissionRecord>, TransportError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match ["data", "tournaments", "applications"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }) {
            Some(items) => items,
            None => {
                return Err(TransportError::InvalidPayload(
                    "expected a list of submissions".to_string(),
                ))
            }
        },
        Value::Null => Vec::new(),
        _ => {
            return Err(TransportError::InvalidPayload(
                "expected a list of submissions".to_string(),
            ))
        }
    };

    // Undecodable elements become empty records so the mapper reports them
    // individually instead of failing the whole fetch.
    Ok(items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).unwrap_or_else(|error| {
                tracing::warn!("Undecodable submission in portal list: {error}");
                SubmissionRecord::default()
            })
        })
        .collect())
}

fn normalize_base_url(raw: &str) -> Result<String, TransportError> {
    let base_url = normalize_text_option(Some(raw.to_string())).ok_or_else(|| {
        TransportError::InvalidConfiguration("portal URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "portal URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpPortalClient {
        HttpPortalClient::from_parts(
            &server.uri(),
            Some("portal-secret".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn app(id: &str) -> ApplicationId {
        ApplicationId::parse(id).unwrap()
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("portal.example").is_err());
        assert_eq!(
            normalize_base_url(" https://portal.example/api/ ").unwrap(),
            "https://portal.example/api"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let client = HttpPortalClient::from_parts(
            "https://portal.example",
            Some("portal-secret".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("portal-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn list_approved_sends_bearer_and_accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/approved-tournaments"))
            .and(header("Authorization", "Bearer portal-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"applicationId": "A1", "eventTitle": "KL Open", "status": "Approved"},
                {"applicationId": 2, "eventTitle": "Penang Masters"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server).list_approved().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].application_id.as_deref(), Some("A1"));
        assert_eq!(records[1].application_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn list_approved_accepts_wrapped_list_and_keeps_bad_elements() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/approved-tournaments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"applicationId": "A1"}, "garbage"]
            })))
            .mount(&server)
            .await;

        let records = client(&server).list_approved().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], SubmissionRecord::default());
    }

    #[tokio::test]
    async fn get_application_classifies_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/applications/A404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).get_application(&app("A404")).await.unwrap_err();
        assert_eq!(err, TransportError::NotFound("A404".to_string()));
    }

    #[tokio::test]
    async fn get_application_unwraps_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/applications/A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"applicationId": "A1", "status": "Rejected"}
            })))
            .mount(&server)
            .await;

        let record = client(&server).get_application(&app("A1")).await.unwrap();
        assert_eq!(record.status.as_deref(), Some("Rejected"));
    }

    #[tokio::test]
    async fn rate_limit_parses_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/approved-tournaments"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let err = client(&server).list_approved().await.unwrap_err();
        assert_eq!(
            err,
            TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
    }

    #[tokio::test]
    async fn server_errors_are_remote_faults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/approved-tournaments"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({"message": "maintenance window"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).list_approved().await.unwrap_err();
        assert_eq!(
            err,
            TransportError::RemoteFault {
                status: 503,
                message: "maintenance window".to_string()
            }
        );
    }

    #[tokio::test]
    async fn other_client_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/applications"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(serde_json::json!({"error": "bad date"})),
            )
            .mount(&server)
            .await;

        let fields = SubmissionFields {
            event_title: "Shah Alam Cup".to_string(),
            event_start_date: "2025-03-10".to_string(),
            event_end_date: None,
            state: None,
            city: None,
            venue: None,
            organiser_name: None,
            tel_contact: None,
            email: None,
            classification: "District".to_string(),
            expected_participants: None,
        };
        let err = client(&server).create_application(&fields).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok"}))
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let client =
            HttpPortalClient::from_parts(&server.uri(), None, Duration::from_millis(100)).unwrap();
        assert_eq!(client.health().await.unwrap_err(), TransportError::Timeout);
    }

    #[tokio::test]
    async fn refused_connections_are_unreachable() {
        let client =
            HttpPortalClient::from_parts("http://127.0.0.1:1", None, Duration::from_secs(2))
                .unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[tokio::test]
    async fn create_application_returns_new_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/applications"))
            .and(body_json(serde_json::json!({
                "eventTitle": "Shah Alam Cup",
                "eventStartDate": "2025-03-10",
                "classification": "District"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"applicationId": "A9"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fields = SubmissionFields {
            event_title: "Shah Alam Cup".to_string(),
            event_start_date: "2025-03-10".to_string(),
            event_end_date: None,
            state: None,
            city: None,
            venue: None,
            organiser_name: None,
            tel_contact: None,
            email: None,
            classification: "District".to_string(),
            expected_participants: None,
        };
        let id = client(&server).create_application(&fields).await.unwrap();
        assert_eq!(id, app("A9"));
    }

    #[tokio::test]
    async fn search_applications_passes_title_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/applications"))
            .and(query_param("eventTitle", "KL Open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tournaments": [{"applicationId": "A1", "eventTitle": "KL Open", "status": "Cancelled"}]
            })))
            .mount(&server)
            .await;

        let records = client(&server).search_applications("KL Open").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].status().is_approved());
    }

    #[tokio::test]
    async fn update_and_delete_use_sync_paths() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sync/tournament/update/A9"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sync/tournament/A9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let fields = SubmissionFields {
            event_title: "Shah Alam Cup".to_string(),
            event_start_date: "2025-03-10".to_string(),
            event_end_date: None,
            state: None,
            city: None,
            venue: None,
            organiser_name: None,
            tel_contact: None,
            email: None,
            classification: "District".to_string(),
            expected_participants: None,
        };
        client.update_application(&app("A9"), &fields).await.unwrap();
        assert!(client
            .delete_application(&app("A9"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn sync_status_passes_counts_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "approved": 12,
                "pending": 3
            })))
            .mount(&server)
            .await;

        let status = client(&server).sync_status().await.unwrap();
        assert_eq!(status.0.get("approved"), Some(&serde_json::json!(12)));
        assert_eq!(status.0.len(), 2);
    }
}
