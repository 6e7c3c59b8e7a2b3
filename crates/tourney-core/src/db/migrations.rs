//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = applied_version(conn).await?;
    tracing::debug!(version, latest = CURRENT_VERSION, "Checking schema version");

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database
async fn applied_version(conn: &Connection) -> Result<i32> {
    let mut tables = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            (),
        )
        .await?;
    if tables.next().await?.is_none() {
        return Ok(0);
    }
    drop(tables);

    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_version", ())
        .await?;
    let latest = match rows.next().await? {
        Some(row) => row.get::<Option<i32>>(0)?,
        None => None,
    };
    Ok(latest.unwrap_or(0))
}

/// Apply a list of statements inside one transaction
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: tournament catalog
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS tournaments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT,
                venue TEXT,
                city TEXT,
                state TEXT,
                organizer TEXT,
                contact_phone TEXT,
                contact_email TEXT,
                description TEXT,
                max_participants INTEGER,
                classification_tier TEXT NOT NULL DEFAULT 'local',
                cross_ref_id TEXT,
                ownership TEXT CHECK (ownership IN ('local', 'submission-owned')),
                last_synced_at INTEGER,
                last_upstream_updated_at INTEGER,
                version INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            // At most one row may hold a given cross-reference id
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tournaments_cross_ref
                ON tournaments(cross_ref_id) WHERE cross_ref_id IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_tournaments_start_date ON tournaments(start_date)",
            "CREATE INDEX IF NOT EXISTS idx_tournaments_ownership ON tournaments(ownership)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: sync run and deletion audit trail
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS sync_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                created INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                linked INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                errors_json TEXT NOT NULL DEFAULT '[]'
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_runs_started_at ON sync_runs(started_at DESC)",
            "CREATE TABLE IF NOT EXISTS deletion_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tournament_id TEXT NOT NULL,
                cross_ref_id TEXT,
                name TEXT NOT NULL,
                reason TEXT NOT NULL,
                deleted_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_deletion_log_deleted_at ON deletion_log(deleted_at DESC)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = applied_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fresh_database_is_unversioned() {
        let conn = setup().await;
        assert_eq!(applied_version(&conn).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_resume_from_applied_version() {
        let conn = setup().await;
        migrate_v1(&conn).await.unwrap();
        assert_eq!(applied_version(&conn).await.unwrap(), 1);
        assert!(!table_exists(&conn, "sync_runs").await);

        run(&conn).await.unwrap();
        assert_eq!(applied_version(&conn).await.unwrap(), CURRENT_VERSION);
        assert!(table_exists(&conn, "sync_runs").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = applied_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v2_creates_audit_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        assert!(table_exists(&conn, "sync_runs").await);
        assert!(table_exists(&conn, "deletion_log").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cross_ref_index_rejects_second_holder() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let insert = "INSERT INTO tournaments (id, name, start_date, cross_ref_id, created_at, updated_at)
                      VALUES (?, 'KL Open', '2025-01-15', 'A1', 0, 0)";
        conn.execute(insert, ["t-1"]).await.unwrap();
        assert!(conn.execute(insert, ["t-2"]).await.is_err());

        // Unlinked rows are unconstrained
        let unlinked = "INSERT INTO tournaments (id, name, start_date, created_at, updated_at)
                        VALUES (?, 'KL Open', '2025-01-15', 0, 0)";
        conn.execute(unlinked, ["t-3"]).await.unwrap();
        conn.execute(unlinked, ["t-4"]).await.unwrap();
    }
}
