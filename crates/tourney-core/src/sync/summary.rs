//! Per-run accounting for the pull synchronizer

use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, SyncError};
use crate::models::SyncRunRecord;
use crate::util::{sanitize, unix_millis_now};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The approved-set fetch failed; nothing was upserted or deleted
    Aborted,
}

impl RunOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Step of a run that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Fetch,
    Map,
    Resolve,
    Upsert,
    DetectDeletion,
    Delete,
    /// The run as a whole, e.g. abandoned by the scheduler
    Run,
}

/// One isolated per-record failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    pub operation: SyncOperation,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub started_at: i64,
    pub finished_at: i64,
    pub outcome: RunOutcome,
    /// New rows mirrored from upstream
    pub created: usize,
    /// Linked rows refreshed with newer upstream values
    pub updated: usize,
    /// Legacy rows that acquired a cross-reference id
    pub linked: usize,
    /// `created + updated + linked`
    pub synced: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub errors: Vec<SyncFailure>,
}

impl SyncSummary {
    pub fn start() -> Self {
        let now = unix_millis_now();
        Self {
            started_at: now,
            finished_at: now,
            outcome: RunOutcome::Completed,
            created: 0,
            updated: 0,
            linked: 0,
            synced: 0,
            skipped: 0,
            deleted: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_failure(
        &mut self,
        operation: SyncOperation,
        application_id: Option<&str>,
        tournament_id: Option<String>,
        error: &SyncError,
    ) {
        tracing::warn!(
            application_id = application_id.unwrap_or_default(),
            tournament_id = tournament_id.as_deref().unwrap_or_default(),
            ?operation,
            kind = %error.kind(),
            "Sync step failed: {}",
            sanitize(error)
        );
        self.errors.push(SyncFailure {
            application_id: application_id.map(str::to_string),
            tournament_id,
            operation,
            kind: error.kind(),
            message: sanitize(error),
        });
    }

    pub fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self.synced = self.created + self.updated + self.linked;
        self.finished_at = unix_millis_now();
        self
    }

    pub fn to_run_record(&self) -> SyncRunRecord {
        SyncRunRecord {
            id: 0,
            started_at: self.started_at,
            finished_at: self.finished_at,
            outcome: self.outcome.as_str().to_string(),
            created: count(self.created),
            updated: count(self.updated),
            linked: count(self.linked),
            skipped: count(self.skipped),
            deleted: count(self.deleted),
            error_count: count(self.errors.len()),
            errors_json: serde_json::to_string(&self.errors).unwrap_or_else(|_| "[]".to_string()),
        }
    }
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::TransportError;
    use pretty_assertions::assert_eq;

    #[test]
    fn finish_totals_synced_rows() {
        let mut summary = SyncSummary::start();
        summary.created = 2;
        summary.updated = 1;
        summary.linked = 1;
        summary.skipped = 3;

        let summary = summary.finish(RunOutcome::Completed);
        assert_eq!(summary.synced, 4);
        assert!(summary.finished_at >= summary.started_at);
    }

    #[test]
    fn run_record_serializes_failures() {
        let mut summary = SyncSummary::start();
        summary.record_failure(
            SyncOperation::Upsert,
            Some("A1"),
            None,
            &SyncError::from(TransportError::Timeout),
        );
        let record = summary.finish(RunOutcome::Completed).to_run_record();

        assert_eq!(record.error_count, 1);
        assert_eq!(record.outcome, "completed");
        let errors: Vec<SyncFailure> = serde_json::from_str(&record.errors_json).unwrap();
        assert_eq!(errors[0].application_id.as_deref(), Some("A1"));
        assert_eq!(errors[0].kind, ErrorKind::Timeout);
    }
}
