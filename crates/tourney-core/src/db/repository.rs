//! Tournament repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::NaiveDate;
use libsql::params::Params;
use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{
    ApplicationId, ClassificationTier, DeletionRecord, Ownership, SyncRunRecord, Tournament,
    TournamentFields, TournamentId,
};
use crate::util::{name_key, unix_millis_now};

const COLUMNS: &str = "id, name, start_date, end_date, venue, city, state, organizer, \
     contact_phone, contact_email, description, max_participants, classification_tier, \
     cross_ref_id, ownership, last_synced_at, last_upstream_updated_at, version, \
     created_at, updated_at";

/// Trait for publication-store tournament operations (async)
///
/// Every mutating call on an existing row takes the version the caller read
/// and fails with [`Error::Conflict`] when the row has moved on.
#[allow(async_fn_in_trait)]
pub trait TournamentRepository {
    /// Create a locally owned tournament
    async fn create_local(&self, fields: &TournamentFields) -> Result<Tournament>;

    /// Create a tournament mirrored from the submission store
    async fn insert_linked(
        &self,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament>;

    /// Get a tournament by ID
    async fn get(&self, id: &TournamentId) -> Result<Option<Tournament>>;

    /// Get the tournament holding a cross-reference id
    async fn find_by_cross_ref(&self, cross_ref_id: &ApplicationId) -> Result<Option<Tournament>>;

    /// Unlinked tournaments with the same name (case-insensitive) and start date
    async fn find_unlinked_by_name_and_date(
        &self,
        name: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<Tournament>>;

    /// Unlinked, non-local tournaments with the same name (case-insensitive),
    /// narrowed to `start_date` when one is given
    async fn find_removal_candidates(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<Tournament>>;

    /// List tournaments ordered by start date
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Tournament>>;

    /// Every row that is not explicitly locally owned
    async fn list_sync_candidates(&self) -> Result<Vec<Tournament>>;

    /// Overwrite a row with upstream values and mark it submission-owned
    async fn apply_upstream(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament>;

    /// Edit a row on behalf of the publication side
    async fn update_local(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
    ) -> Result<Tournament>;

    /// Record a successful push: link and hand ownership to the submission store
    async fn mark_synced(
        &self,
        id: &TournamentId,
        expected_version: i64,
        cross_ref_id: &ApplicationId,
    ) -> Result<Tournament>;

    /// Explicit ownership change
    async fn transfer_ownership(
        &self,
        id: &TournamentId,
        expected_version: i64,
        ownership: Ownership,
    ) -> Result<Tournament>;

    /// Hard delete
    async fn delete(&self, id: &TournamentId, expected_version: i64) -> Result<()>;

    /// Persist a pull run summary, returning its row id
    async fn record_sync_run(&self, run: &SyncRunRecord) -> Result<i64>;

    /// Most recent runs first
    async fn list_sync_runs(&self, limit: usize) -> Result<Vec<SyncRunRecord>>;

    /// Persist a deletion trace
    async fn record_deletion(&self, tournament: &Tournament, reason: &str) -> Result<()>;

    /// Most recent deletions first
    async fn list_deletions(&self, limit: usize) -> Result<Vec<DeletionRecord>>;
}

/// libSQL implementation of `TournamentRepository`
pub struct LibSqlTournamentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTournamentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_tournaments(&self, sql: &str, params: Params) -> Result<Vec<Tournament>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut tournaments = Vec::new();
        while let Some(row) = rows.next().await? {
            tournaments.push(parse_tournament(&row)?);
        }
        Ok(tournaments)
    }

    async fn query_one(&self, sql: &str, params: Params) -> Result<Option<Tournament>> {
        Ok(self.query_tournaments(sql, params).await?.into_iter().next())
    }

    async fn require(&self, id: &TournamentId) -> Result<Tournament> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Run a `... WHERE id = ? AND version = ?` write and classify a miss
    async fn versioned_write(
        &self,
        id: &TournamentId,
        expected_version: i64,
        sql: &str,
        params: Vec<Value>,
        cross_ref_id: Option<&ApplicationId>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(sql, Params::Positional(params))
            .await
            .map_err(|error| classify_write_error(error, cross_ref_id))?;

        if rows == 0 {
            let current = self.require(id).await?;
            return Err(Error::Conflict {
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        Ok(())
    }

    async fn insert(&self, tournament: &Tournament) -> Result<()> {
        let sql = format!(
            "INSERT INTO tournaments ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let mut values = vec![Value::Text(tournament.id.as_str())];
        values.extend(field_values(&tournament.fields));
        values.extend([
            text(tournament.cross_ref_id.as_ref().map(ApplicationId::as_str)),
            text(tournament.ownership.map(Ownership::as_str)),
            integer(tournament.last_synced_at),
            integer(tournament.last_upstream_updated_at),
            Value::Integer(tournament.version),
            Value::Integer(tournament.created_at),
            Value::Integer(tournament.updated_at),
        ]);

        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|error| classify_write_error(error, tournament.cross_ref_id.as_ref()))?;
        Ok(())
    }
}

impl TournamentRepository for LibSqlTournamentRepository<'_> {
    async fn create_local(&self, fields: &TournamentFields) -> Result<Tournament> {
        fields.validate().map_err(Error::InvalidInput)?;

        let now = unix_millis_now();
        let tournament = Tournament {
            id: TournamentId::new(),
            fields: fields.clone(),
            cross_ref_id: None,
            ownership: Some(Ownership::Local),
            last_synced_at: None,
            last_upstream_updated_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.insert(&tournament).await?;
        Ok(tournament)
    }

    async fn insert_linked(
        &self,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament> {
        let now = unix_millis_now();
        let tournament = Tournament {
            id: TournamentId::new(),
            fields: fields.clone(),
            cross_ref_id: Some(cross_ref_id.clone()),
            ownership: Some(Ownership::SubmissionOwned),
            last_synced_at: Some(now),
            last_upstream_updated_at: upstream_updated_at,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.insert(&tournament).await?;
        Ok(tournament)
    }

    async fn get(&self, id: &TournamentId) -> Result<Option<Tournament>> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM tournaments WHERE id = ?"),
            Params::Positional(vec![Value::Text(id.as_str())]),
        )
        .await
    }

    async fn find_by_cross_ref(&self, cross_ref_id: &ApplicationId) -> Result<Option<Tournament>> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM tournaments WHERE cross_ref_id = ?"),
            Params::Positional(vec![Value::Text(cross_ref_id.as_str().to_string())]),
        )
        .await
    }

    async fn find_unlinked_by_name_and_date(
        &self,
        name: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<Tournament>> {
        let key = name_key(name);
        let candidates = self
            .query_tournaments(
                &format!(
                    "SELECT {COLUMNS} FROM tournaments
                     WHERE cross_ref_id IS NULL AND start_date = ?"
                ),
                Params::Positional(vec![Value::Text(start_date.to_string())]),
            )
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|tournament| name_key(&tournament.fields.name) == key)
            .collect())
    }

    async fn find_removal_candidates(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<Tournament>> {
        let key = name_key(name);
        let unlinked = format!(
            "SELECT {COLUMNS} FROM tournaments
             WHERE cross_ref_id IS NULL AND (ownership IS NULL OR ownership <> 'local')"
        );
        let candidates = match start_date {
            Some(start_date) => {
                self.query_tournaments(
                    &format!("{unlinked} AND start_date = ?"),
                    Params::Positional(vec![Value::Text(start_date.to_string())]),
                )
                .await?
            }
            None => self.query_tournaments(&unlinked, Params::None).await?,
        };
        Ok(candidates
            .into_iter()
            .filter(|tournament| name_key(&tournament.fields.name) == key)
            .collect())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Tournament>> {
        self.query_tournaments(
            &format!(
                "SELECT {COLUMNS} FROM tournaments
                 ORDER BY start_date ASC, name ASC
                 LIMIT ? OFFSET ?"
            ),
            Params::Positional(vec![
                Value::Integer(limit as i64),
                Value::Integer(offset as i64),
            ]),
        )
        .await
    }

    async fn list_sync_candidates(&self) -> Result<Vec<Tournament>> {
        self.query_tournaments(
            &format!(
                "SELECT {COLUMNS} FROM tournaments
                 WHERE ownership IS NULL OR ownership = 'submission-owned'
                 ORDER BY created_at ASC"
            ),
            Params::None,
        )
        .await
    }

    async fn apply_upstream(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
        cross_ref_id: &ApplicationId,
        upstream_updated_at: Option<i64>,
    ) -> Result<Tournament> {
        let now = unix_millis_now();
        let mut values = field_values(fields);
        values.extend([
            Value::Text(cross_ref_id.as_str().to_string()),
            Value::Integer(now),
            integer(upstream_updated_at),
            Value::Integer(now),
            Value::Text(id.as_str()),
            Value::Integer(expected_version),
        ]);

        self.versioned_write(
            id,
            expected_version,
            "UPDATE tournaments SET
                name = ?, start_date = ?, end_date = ?, venue = ?, city = ?, state = ?,
                organizer = ?, contact_phone = ?, contact_email = ?,
                description = COALESCE(?, description),
                max_participants = ?, classification_tier = ?,
                cross_ref_id = ?, ownership = 'submission-owned',
                last_synced_at = ?, last_upstream_updated_at = COALESCE(?, last_upstream_updated_at),
                updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
            values,
            Some(cross_ref_id),
        )
        .await?;
        self.require(id).await
    }

    async fn update_local(
        &self,
        id: &TournamentId,
        expected_version: i64,
        fields: &TournamentFields,
    ) -> Result<Tournament> {
        fields.validate().map_err(Error::InvalidInput)?;

        let current = self.require(id).await?;
        if current.is_submission_owned() {
            return Err(Error::OwnershipViolation(format!(
                "tournament {id} is owned by the submission store; transfer ownership before editing"
            )));
        }

        let mut values = field_values(fields);
        values.extend([
            Value::Integer(unix_millis_now()),
            Value::Text(id.as_str()),
            Value::Integer(expected_version),
        ]);

        // The ownership guard is repeated in SQL so a concurrent pull that
        // claimed the row in between cannot be overwritten.
        self.versioned_write(
            id,
            expected_version,
            "UPDATE tournaments SET
                name = ?, start_date = ?, end_date = ?, venue = ?, city = ?, state = ?,
                organizer = ?, contact_phone = ?, contact_email = ?, description = ?,
                max_participants = ?, classification_tier = ?,
                updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?
               AND (ownership IS NULL OR ownership = 'local')",
            values,
            None,
        )
        .await?;
        self.require(id).await
    }

    async fn mark_synced(
        &self,
        id: &TournamentId,
        expected_version: i64,
        cross_ref_id: &ApplicationId,
    ) -> Result<Tournament> {
        let now = unix_millis_now();
        self.versioned_write(
            id,
            expected_version,
            "UPDATE tournaments SET
                cross_ref_id = ?, ownership = 'submission-owned',
                last_synced_at = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
            vec![
                Value::Text(cross_ref_id.as_str().to_string()),
                Value::Integer(now),
                Value::Integer(now),
                Value::Text(id.as_str()),
                Value::Integer(expected_version),
            ],
            Some(cross_ref_id),
        )
        .await?;
        self.require(id).await
    }

    async fn transfer_ownership(
        &self,
        id: &TournamentId,
        expected_version: i64,
        ownership: Ownership,
    ) -> Result<Tournament> {
        self.versioned_write(
            id,
            expected_version,
            "UPDATE tournaments SET ownership = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
            vec![
                Value::Text(ownership.as_str().to_string()),
                Value::Integer(unix_millis_now()),
                Value::Text(id.as_str()),
                Value::Integer(expected_version),
            ],
            None,
        )
        .await?;
        self.require(id).await
    }

    async fn delete(&self, id: &TournamentId, expected_version: i64) -> Result<()> {
        self.versioned_write(
            id,
            expected_version,
            "DELETE FROM tournaments WHERE id = ? AND version = ?",
            vec![Value::Text(id.as_str()), Value::Integer(expected_version)],
            None,
        )
        .await
    }

    async fn record_sync_run(&self, run: &SyncRunRecord) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_runs (
                    started_at, finished_at, outcome, created, updated, linked,
                    skipped, deleted, error_count, errors_json
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                Params::Positional(vec![
                    Value::Integer(run.started_at),
                    Value::Integer(run.finished_at),
                    Value::Text(run.outcome.clone()),
                    Value::Integer(run.created),
                    Value::Integer(run.updated),
                    Value::Integer(run.linked),
                    Value::Integer(run.skipped),
                    Value::Integer(run.deleted),
                    Value::Integer(run.error_count),
                    Value::Text(run.errors_json.clone()),
                ]),
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn list_sync_runs(&self, limit: usize) -> Result<Vec<SyncRunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, outcome, created, updated, linked,
                        skipped, deleted, error_count, errors_json
                 FROM sync_runs
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?",
                Params::Positional(vec![Value::Integer(limit as i64)]),
            )
            .await?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(SyncRunRecord {
                id: required_integer(&row, 0)?,
                started_at: required_integer(&row, 1)?,
                finished_at: required_integer(&row, 2)?,
                outcome: required_text(&row, 3)?,
                created: required_integer(&row, 4)?,
                updated: required_integer(&row, 5)?,
                linked: required_integer(&row, 6)?,
                skipped: required_integer(&row, 7)?,
                deleted: required_integer(&row, 8)?,
                error_count: required_integer(&row, 9)?,
                errors_json: required_text(&row, 10)?,
            });
        }
        Ok(runs)
    }

    async fn record_deletion(&self, tournament: &Tournament, reason: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO deletion_log (tournament_id, cross_ref_id, name, reason, deleted_at)
                 VALUES (?, ?, ?, ?, ?)",
                Params::Positional(vec![
                    Value::Text(tournament.id.as_str()),
                    text(tournament.cross_ref_id.as_ref().map(ApplicationId::as_str)),
                    Value::Text(tournament.fields.name.clone()),
                    Value::Text(reason.to_string()),
                    Value::Integer(unix_millis_now()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn list_deletions(&self, limit: usize) -> Result<Vec<DeletionRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tournament_id, cross_ref_id, name, reason, deleted_at
                 FROM deletion_log
                 ORDER BY deleted_at DESC, id DESC
                 LIMIT ?",
                Params::Positional(vec![Value::Integer(limit as i64)]),
            )
            .await?;

        let mut deletions = Vec::new();
        while let Some(row) = rows.next().await? {
            deletions.push(DeletionRecord {
                id: required_integer(&row, 0)?,
                tournament_id: required_text(&row, 1)?,
                cross_ref_id: optional_text(&row, 2)?,
                name: required_text(&row, 3)?,
                reason: required_text(&row, 4)?,
                deleted_at: required_integer(&row, 5)?,
            });
        }
        Ok(deletions)
    }
}

/// Positional values for the twelve editable columns, in `COLUMNS` order
fn field_values(fields: &TournamentFields) -> Vec<Value> {
    vec![
        Value::Text(fields.name.trim().to_string()),
        Value::Text(fields.start_date.to_string()),
        text(fields.end_date.map(|date| date.to_string()).as_deref()),
        text(fields.venue.as_deref()),
        text(fields.city.as_deref()),
        text(fields.state.as_deref()),
        text(fields.organizer.as_deref()),
        text(fields.contact_phone.as_deref()),
        text(fields.contact_email.as_deref()),
        text(fields.description.as_deref()),
        integer(fields.max_participants.map(i64::from)),
        Value::Text(fields.classification_tier.as_str().to_string()),
    ]
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

fn integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn classify_write_error(error: libsql::Error, cross_ref_id: Option<&ApplicationId>) -> Error {
    let message = error.to_string();
    match cross_ref_id {
        Some(cross_ref_id)
            if message.contains("UNIQUE constraint failed")
                && message.contains("cross_ref_id") =>
        {
            Error::DuplicateCrossRef(cross_ref_id.to_string())
        }
        _ => error.into(),
    }
}

fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "column {idx}: expected text, found {other:?}"
        ))),
    }
}

fn required_text(row: &Row, idx: i32) -> Result<String> {
    optional_text(row, idx)?
        .ok_or_else(|| Error::Database(format!("column {idx}: unexpected NULL")))
}

fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "column {idx}: expected integer, found {other:?}"
        ))),
    }
}

fn required_integer(row: &Row, idx: i32) -> Result<i64> {
    optional_integer(row, idx)?
        .ok_or_else(|| Error::Database(format!("column {idx}: unexpected NULL")))
}

fn parse_date(row: &Row, idx: i32) -> Result<Option<NaiveDate>> {
    optional_text(row, idx)?
        .map(|value| {
            value
                .parse::<NaiveDate>()
                .map_err(|error| Error::Database(format!("column {idx}: invalid date: {error}")))
        })
        .transpose()
}

/// Parse a tournament from a row selected with `COLUMNS`
fn parse_tournament(row: &Row) -> Result<Tournament> {
    let id = required_text(row, 0)?;
    let start_date = parse_date(row, 2)?
        .ok_or_else(|| Error::Database("tournament without start date".to_string()))?;
    let classification_tier = required_text(row, 12)?
        .parse::<ClassificationTier>()
        .unwrap_or_default();
    let ownership = optional_text(row, 14)?
        .map(|value| value.parse::<Ownership>().map_err(Error::Database))
        .transpose()?;

    Ok(Tournament {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid tournament id: {id}")))?,
        fields: TournamentFields {
            name: required_text(row, 1)?,
            start_date,
            end_date: parse_date(row, 3)?,
            venue: optional_text(row, 4)?,
            city: optional_text(row, 5)?,
            state: optional_text(row, 6)?,
            organizer: optional_text(row, 7)?,
            contact_phone: optional_text(row, 8)?,
            contact_email: optional_text(row, 9)?,
            description: optional_text(row, 10)?,
            max_participants: optional_integer(row, 11)?.and_then(|value| u32::try_from(value).ok()),
            classification_tier,
        },
        cross_ref_id: optional_text(row, 13)?.and_then(ApplicationId::parse),
        ownership,
        last_synced_at: optional_integer(row, 15)?,
        last_upstream_updated_at: optional_integer(row, 16)?,
        version: required_integer(row, 17)?,
        created_at: required_integer(row, 18)?,
        updated_at: required_integer(row, 19)?,
    })
}
