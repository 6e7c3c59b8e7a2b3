//! In-process submission portal for tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::error::TransportError;
use super::portal::{PortalSyncStatus, SubmissionPortal};
use crate::models::{ApplicationId, SubmissionFields, SubmissionRecord};
use crate::util::name_key;

/// Build an upstream record with the identity fields set
pub fn submission(id: &str, title: &str, start_date: &str, status: &str) -> SubmissionRecord {
    SubmissionRecord {
        application_id: Some(id.to_string()),
        event_title: Some(title.to_string()),
        event_start_date: Some(start_date.to_string()),
        status: Some(status.to_string()),
        ..SubmissionRecord::default()
    }
}

#[derive(Default)]
struct FakeState {
    applications: BTreeMap<String, SubmissionRecord>,
    list_failure: Option<TransportError>,
    lookup_failure: Option<TransportError>,
    write_failure: Option<TransportError>,
    empty_list: bool,
    stalled_list: bool,
    next_id: u32,
    calls: Vec<String>,
}

/// Submission store kept in memory, with switchable failure modes
pub struct FakePortal {
    state: Mutex<FakeState>,
}

impl Default for FakePortal {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePortal {
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    /// Created applications are numbered `A{next_id}`, `A{next_id + 1}`, ...
    pub fn with_next_id(next_id: u32) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id,
                ..FakeState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, record: SubmissionRecord) {
        let id = record.application_id.clone().unwrap_or_default();
        self.state().applications.insert(id, record);
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(record) = self.state().applications.get_mut(id) {
            record.status = Some(status.to_string());
        }
    }

    pub fn remove(&self, id: &str) {
        self.state().applications.remove(id);
    }

    pub fn application(&self, id: &str) -> Option<SubmissionRecord> {
        self.state().applications.get(id).cloned()
    }

    /// Make `list_approved` fail
    pub fn fail_list(&self, error: Option<TransportError>) {
        self.state().list_failure = error;
    }

    /// Make `get_application` and `search_applications` fail
    pub fn fail_lookups(&self, error: Option<TransportError>) {
        self.state().lookup_failure = error;
    }

    /// Make create, update and delete fail
    pub fn fail_writes(&self, error: Option<TransportError>) {
        self.state().write_failure = error;
    }

    /// Simulate a transient gap where the approved list comes back empty
    pub fn return_empty_list(&self, empty: bool) {
        self.state().empty_list = empty;
    }

    /// Make `list_approved` never complete
    pub fn stall_list(&self, stalled: bool) {
        self.state().stalled_list = stalled;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    fn record_call(&self, call: String) -> MutexGuard<'_, FakeState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

fn record_from_fields(id: &str, fields: &SubmissionFields) -> SubmissionRecord {
    SubmissionRecord {
        application_id: Some(id.to_string()),
        event_title: Some(fields.event_title.clone()),
        event_start_date: Some(fields.event_start_date.clone()),
        event_end_date: fields.event_end_date.clone(),
        state: fields.state.clone(),
        city: fields.city.clone(),
        venue: fields.venue.clone(),
        organiser_name: fields.organiser_name.clone(),
        tel_contact: fields.tel_contact.clone(),
        email: fields.email.clone(),
        classification: Some(fields.classification.clone()),
        expected_participants: fields.expected_participants.map(|value| value.to_string()),
        status: Some("Approved".to_string()),
        last_updated: Some(chrono::Utc::now().to_rfc3339()),
    }
}

#[async_trait]
impl SubmissionPortal for FakePortal {
    async fn list_approved(&self) -> Result<Vec<SubmissionRecord>, TransportError> {
        let listed = {
            let state = self.record_call("list_approved".to_string());
            if let Some(error) = state.list_failure.clone() {
                return Err(error);
            }
            if state.stalled_list {
                None
            } else if state.empty_list {
                Some(Vec::new())
            } else {
                Some(
                    state
                        .applications
                        .values()
                        .filter(|record| record.status().is_approved())
                        .cloned()
                        .collect(),
                )
            }
        };
        match listed {
            Some(records) => Ok(records),
            None => std::future::pending().await,
        }
    }

    async fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<SubmissionRecord, TransportError> {
        let state = self.record_call(format!("get_application {id}"));
        if let Some(error) = state.lookup_failure.clone() {
            return Err(error);
        }
        state
            .applications
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }

    async fn search_applications(
        &self,
        title: &str,
    ) -> Result<Vec<SubmissionRecord>, TransportError> {
        let state = self.record_call(format!("search_applications {title}"));
        if let Some(error) = state.lookup_failure.clone() {
            return Err(error);
        }
        let key = name_key(title);
        Ok(state
            .applications
            .values()
            .filter(|record| record.event_title.as_deref().map(name_key) == Some(key.clone()))
            .cloned()
            .collect())
    }

    async fn create_application(
        &self,
        fields: &SubmissionFields,
    ) -> Result<ApplicationId, TransportError> {
        let mut state = self.record_call(format!("create_application {}", fields.event_title));
        if let Some(error) = state.write_failure.clone() {
            return Err(error);
        }
        let id = format!("A{}", state.next_id);
        state.next_id += 1;
        state
            .applications
            .insert(id.clone(), record_from_fields(&id, fields));
        ApplicationId::parse(&id)
            .ok_or_else(|| TransportError::InvalidPayload("blank application id".to_string()))
    }

    async fn update_application(
        &self,
        id: &ApplicationId,
        fields: &SubmissionFields,
    ) -> Result<(), TransportError> {
        let mut state = self.record_call(format!("update_application {id}"));
        if let Some(error) = state.write_failure.clone() {
            return Err(error);
        }
        let Some(existing) = state.applications.get(id.as_str()) else {
            return Err(TransportError::NotFound(id.to_string()));
        };
        let mut updated = record_from_fields(id.as_str(), fields);
        updated.status.clone_from(&existing.status);
        state.applications.insert(id.to_string(), updated);
        Ok(())
    }

    async fn delete_application(&self, id: &ApplicationId) -> Result<(), TransportError> {
        let mut state = self.record_call(format!("delete_application {id}"));
        if let Some(error) = state.write_failure.clone() {
            return Err(error);
        }
        state
            .applications
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(id.to_string()))
    }

    async fn health(&self) -> Result<(), TransportError> {
        let state = self.record_call("health".to_string());
        state.list_failure.clone().map_or(Ok(()), Err)
    }

    async fn sync_status(&self) -> Result<PortalSyncStatus, TransportError> {
        let state = self.record_call("sync_status".to_string());
        if let Some(error) = state.list_failure.clone() {
            return Err(error);
        }
        let approved = state
            .applications
            .values()
            .filter(|record| record.status().is_approved())
            .count();
        let mut counts = BTreeMap::new();
        counts.insert("total".to_string(), state.applications.len().into());
        counts.insert("approved".to_string(), approved.into());
        Ok(PortalSyncStatus(counts))
    }
}
