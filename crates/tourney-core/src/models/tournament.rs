//! Tournament model (publication-store view)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ApplicationId;

/// A unique identifier for a tournament, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentId(Uuid);

impl TournamentId {
    /// Create a new unique tournament ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TournamentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TournamentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TournamentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Public classification tier of a tournament
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    #[default]
    Local,
    State,
    National,
    International,
}

impl ClassificationTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::State => "state",
            Self::National => "national",
            Self::International => "international",
        }
    }
}

impl fmt::Display for ClassificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "state" => Ok(Self::State),
            "national" => Ok(Self::National),
            "international" => Ok(Self::International),
            other => Err(format!("Unknown classification tier: {other}")),
        }
    }
}

/// Which side is authoritative for the next write to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ownership {
    /// Created in the publication store; pushed upstream on local mutation
    Local,
    /// Mirrored from the submission store; pull is authoritative
    SubmissionOwned,
}

impl Ownership {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::SubmissionOwned => "submission-owned",
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ownership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(Self::Local),
            "submission-owned" => Ok(Self::SubmissionOwned),
            other => Err(format!("Unknown ownership: {other}")),
        }
    }
}

/// Editable tournament attributes shared by both synchronization directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentFields {
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Publication-only; never supplied by the submission store
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub classification_tier: ClassificationTier,
}

impl TournamentFields {
    /// Minimal field set with every optional attribute empty
    #[must_use]
    pub fn new(name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start_date,
            end_date: None,
            venue: None,
            city: None,
            state: None,
            organizer: None,
            contact_phone: None,
            contact_email: None,
            description: None,
            max_participants: None,
            classification_tier: ClassificationTier::default(),
        }
    }

    /// Whether applying `incoming` from upstream would change anything.
    ///
    /// `description` only counts when upstream actually supplies one, since
    /// the store keeps the local description otherwise.
    #[must_use]
    pub fn differs_from_upstream(&self, incoming: &Self) -> bool {
        self.name != incoming.name
            || self.start_date != incoming.start_date
            || self.end_date != incoming.end_date
            || self.venue != incoming.venue
            || self.city != incoming.city
            || self.state != incoming.state
            || self.organizer != incoming.organizer
            || self.contact_phone != incoming.contact_phone
            || self.contact_email != incoming.contact_email
            || self.max_participants != incoming.max_participants
            || self.classification_tier != incoming.classification_tier
            || (incoming.description.is_some() && self.description != incoming.description)
    }

    /// Validate fields before a local write
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tournament name must not be empty".to_string());
        }
        if let Some(end_date) = self.end_date {
            if end_date < self.start_date {
                return Err("end date must not precede start date".to_string());
            }
        }
        Ok(())
    }
}

/// A tournament in the publication store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    /// Store-assigned identifier
    pub id: TournamentId,
    #[serde(flatten)]
    pub fields: TournamentFields,
    /// Submission-store identifier, once linked
    pub cross_ref_id: Option<ApplicationId>,
    /// `None` for legacy rows that predate ownership tracking
    pub ownership: Option<Ownership>,
    /// Last successful sync in either direction (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Upstream `lastUpdated` observed at the last pull (Unix ms)
    pub last_upstream_updated_at: Option<i64>,
    /// Optimistic concurrency version, incremented on every write
    pub version: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Tournament {
    pub fn is_local(&self) -> bool {
        self.ownership == Some(Ownership::Local)
    }

    pub fn is_submission_owned(&self) -> bool {
        self.ownership == Some(Ownership::SubmissionOwned)
    }

    /// Ordering key for picking the freshest of several heuristic matches
    pub fn recency_key(&self) -> (i64, i64) {
        (
            self.last_upstream_updated_at.unwrap_or_default(),
            self.updated_at,
        )
    }
}
