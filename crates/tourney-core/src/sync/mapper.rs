//! Field mapping between submission records and publication tournaments.
//!
//! Pure functions only. Malformed optional fields are dropped rather than
//! failing the record; only the three identity fields (`applicationId`,
//! `eventTitle`, `eventStartDate`) are required.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use super::error::MappingError;
use crate::models::{
    ApplicationId, ClassificationTier, SubmissionFields, SubmissionRecord, SubmissionStatus,
    TournamentFields,
};

/// A submission record translated into publication terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedSubmission {
    pub application_id: ApplicationId,
    pub fields: TournamentFields,
    pub status: SubmissionStatus,
    /// Upstream `lastUpdated` (Unix ms), when parseable
    pub last_updated: Option<i64>,
}

/// Translate an upstream record into publication fields
pub fn to_publication(record: &SubmissionRecord) -> Result<MappedSubmission, MappingError> {
    let application_id = record
        .application_id()
        .ok_or(MappingError::MissingField("applicationId"))?;
    let name = record
        .event_title
        .clone()
        .ok_or(MappingError::MissingField("eventTitle"))?;
    let raw_start = record
        .event_start_date
        .as_deref()
        .ok_or(MappingError::MissingField("eventStartDate"))?;
    let start_date = parse_date(raw_start).ok_or_else(|| MappingError::Malformed {
        field: "eventStartDate",
        value: raw_start.to_string(),
    })?;

    let end_date = record
        .event_end_date
        .as_deref()
        .and_then(parse_date)
        .filter(|end| *end >= start_date);

    let fields = TournamentFields {
        name,
        start_date,
        end_date,
        venue: record.venue.clone(),
        city: record.city.clone(),
        state: record.state.clone(),
        organizer: record.organiser_name.clone(),
        contact_phone: record.tel_contact.clone(),
        contact_email: record.email.clone(),
        description: None,
        max_participants: record
            .expected_participants
            .as_deref()
            .and_then(parse_participants),
        classification_tier: classify(record.classification.as_deref()),
    };

    Ok(MappedSubmission {
        application_id,
        fields,
        status: record.status(),
        last_updated: record.last_updated.as_deref().and_then(parse_timestamp_ms),
    })
}

/// Translate publication fields into a portal create/update body
pub fn to_submission(fields: &TournamentFields) -> SubmissionFields {
    SubmissionFields {
        event_title: fields.name.trim().to_string(),
        event_start_date: fields.start_date.to_string(),
        event_end_date: fields.end_date.map(|date| date.to_string()),
        state: fields.state.clone(),
        city: fields.city.clone(),
        venue: fields.venue.clone(),
        organiser_name: fields.organizer.clone(),
        tel_contact: fields.contact_phone.clone(),
        email: fields.contact_email.clone(),
        classification: classification_label(fields.classification_tier).to_string(),
        expected_participants: fields.max_participants,
    }
}

/// Upstream classification vocabulary to tier; unknown values map to `Local`
pub fn classify(raw: Option<&str>) -> ClassificationTier {
    let Some(raw) = raw else {
        return ClassificationTier::Local;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "state" => ClassificationTier::State,
        "national" => ClassificationTier::National,
        "international" => ClassificationTier::International,
        "district" | "divisional" | "local" => ClassificationTier::Local,
        other => {
            tracing::debug!("Unknown classification {other:?}; defaulting to local tier");
            ClassificationTier::Local
        }
    }
}

pub const fn classification_label(tier: ClassificationTier) -> &'static str {
    match tier {
        ClassificationTier::Local => "District",
        ClassificationTier::State => "State",
        ClassificationTier::National => "National",
        ClassificationTier::International => "International",
    }
}

/// Parse the date formats the portal has been seen to emit
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }
    if let Some(datetime) = parse_naive_datetime(raw) {
        return Some(datetime.date());
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}

/// Parse an upstream timestamp into Unix milliseconds (naive values are UTC)
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(number) = raw.parse::<i64>() {
        // Ten-digit values are seconds
        return Some(if number.abs() < 100_000_000_000 {
            number.saturating_mul(1_000)
        } else {
            number
        });
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.timestamp_millis());
    }
    if let Some(datetime) = parse_naive_datetime(raw) {
        return Some(datetime.and_utc().timestamp_millis());
    }
    parse_date(raw).map(|date| date.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_participants(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<u32>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX) {
        Some(value.round() as u32)
    } else {
        None
    }
}
