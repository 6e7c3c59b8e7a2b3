//! Shared publication-store wrapper used by the sync engine and its clients.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::db::{Database, LibSqlTournamentRepository, TournamentRepository};
use crate::models::{
    ApplicationId, DeletionRecord, Ownership, SyncRunRecord, Tournament, TournamentFields,
    TournamentId,
};
use crate::Result;

/// Thread-safe handle to the publication store.
#[derive(Clone)]
pub struct PublicationStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl PublicationStore {
    /// Open the store at the given filesystem path (`:memory:` is accepted).
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if db_path.as_os_str() == ":memory:" {
            return Self::open_in_memory().await;
        }
        if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening publication store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Create a locally owned tournament.
    pub async fn create_local(&self, fields: &TournamentFields) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.create_local(fields).await
    }

    /// Create a tournament mirrored from an approved submission.
    pub async fn insert_linked(
        &self,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.insert_linked(fields, cross_ref_id, upstream_updated_at)
            .await
    }

    /// Fetch a tournament by id.
    pub async fn get(&self, id: &TournamentId) -> Result<Option<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.get(id).await
    }

    /// Fetch the tournament linked to a submission.
    pub async fn find_by_cross_ref(
        &self,
        cross_ref_id: &ApplicationId,
    ) -> Result<Option<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.find_by_cross_ref(cross_ref_id).await
    }

    /// Unlinked tournaments with a matching name and start date.
    pub async fn find_unlinked_by_name_and_date(
        &self,
        name: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.find_unlinked_by_name_and_date(name, start_date).await
    }

    /// Mirrored or legacy rows an upstream removal may refer to by name.
    pub async fn find_removal_candidates(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.find_removal_candidates(name, start_date).await
    }

    /// List tournaments by start date.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.list(limit, offset).await
    }

    /// Rows the deletion detector is allowed to inspect.
    pub async fn list_sync_candidates(&self) -> Result<Vec<Tournament>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.list_sync_candidates().await
    }

    /// Overwrite a row with upstream values.
    pub async fn apply_upstream(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.apply_upstream(id, expected_version, fields, cross_ref_id, upstream_updated_at)
            .await
    }

    /// Edit a locally owned row.
    pub async fn update_local(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
    ) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.update_local(id, expected_version, fields).await
    }

    /// Link a row after a successful push.
    pub async fn mark_synced(
        &self,
        id: &TournamentId,
        expected_version: i64,
        cross_ref_id: &ApplicationId,
    ) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.mark_synced(id, expected_version, cross_ref_id).await
    }

    /// Change which side owns a row.
    pub async fn transfer_ownership(
        &self,
        id: &TournamentId,
        expected_version: i64,
        ownership: Ownership,
    ) -> Result<Tournament> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.transfer_ownership(id, expected_version, ownership)
            .await
    }

    /// Delete a row and record why.
    pub async fn delete(&self, tournament: &Tournament, reason: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.delete(&tournament.id, tournament.version).await?;
        if let Err(error) = repo.record_deletion(tournament, reason).await {
            tracing::warn!(
                "Deleted tournament {} but failed to record the deletion: {}",
                tournament.id,
                error
            );
        }
        Ok(())
    }

    /// Persist a pull run summary.
    pub async fn record_sync_run(&self, run: &SyncRunRecord) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.record_sync_run(run).await
    }

    /// Recent pull runs, newest first.
    pub async fn list_sync_runs(&self, limit: usize) -> Result<Vec<SyncRunRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.list_sync_runs(limit).await
    }

    /// Recent deletions, newest first.
    pub async fn list_deletions(&self, limit: usize) -> Result<Vec<DeletionRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlTournamentRepository::new(db.connection());
        repo.list_deletions(limit).await
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(sql, ()).await?;
        Ok(())
    }
}
