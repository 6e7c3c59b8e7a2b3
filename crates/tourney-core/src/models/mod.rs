//! Data models for tourney-sync

mod submission;
mod sync_run;
mod tournament;

pub use submission::{ApplicationId, SubmissionFields, SubmissionRecord, SubmissionStatus};
pub use sync_run::{DeletionRecord, SyncRunRecord};
pub use tournament::{ClassificationTier, Ownership, Tournament, TournamentFields, TournamentId};
