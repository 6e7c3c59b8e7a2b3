//! Persisted audit records for synchronization runs and deletions

use serde::{Deserialize, Serialize};

/// Stored summary of one pull run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    /// Row identifier
    pub id: i64,
    /// Run start (Unix ms)
    pub started_at: i64,
    /// Run end (Unix ms)
    pub finished_at: i64,
    /// `completed` or `aborted`
    pub outcome: String,
    pub created: i64,
    pub updated: i64,
    pub linked: i64,
    pub skipped: i64,
    pub deleted: i64,
    /// Number of per-record failures
    pub error_count: i64,
    /// Serialized failure list
    pub errors_json: String,
}

/// Stored trace of a tournament removed by synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub id: i64,
    pub tournament_id: String,
    pub cross_ref_id: Option<String>,
    pub name: String,
    /// Machine-readable reason label
    pub reason: String,
    /// Deletion timestamp (Unix ms)
    pub deleted_at: i64,
}
