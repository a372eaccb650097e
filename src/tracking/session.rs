//! Session records: one observed livestream or archived video.
//!
//! Raw records arrive from the Helix API as JSON objects; this module
//! normalizes them into immutable [`Session`] values at calendar-day
//! resolution. Merge and dedup logic downstream operates on days, so
//! time-of-day is deliberately discarded here.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Raw JSON object as returned by the API layer.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Error raised when a raw record is missing required fields or carries
/// values that cannot be parsed. Not retried by the core; the caller
/// decides whether to skip the record or abort.
#[derive(Error, Debug)]
pub enum MalformedRecordError {
    /// Required field is absent from the raw record
    #[error("Missing required field '{field}' in raw record")]
    MissingField { field: &'static str },

    /// Field is present but not parseable as an integer
    #[error("Field '{field}' is not a valid integer: {value}")]
    InvalidInteger { field: &'static str, value: String },

    /// Field is present but not parseable as a date
    #[error("Field '{field}' is not a valid date: {value}")]
    InvalidDate { field: &'static str, value: String },
}

/// Identity used to bucket a broadcaster's history by content title.
///
/// Livestreams are keyed by numeric title id, archived videos by title
/// name. The kind of a key never changes for the lifetime of that key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TitleKey {
    Live(u64),
    Recording(String),
}

impl TitleKey {
    pub fn is_live(&self) -> bool {
        matches!(self, TitleKey::Live(_))
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, TitleKey::Recording(_))
    }
}

impl fmt::Display for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TitleKey::Live(id) => write!(f, "{}", id),
            TitleKey::Recording(name) => write!(f, "{}", name),
        }
    }
}

// The persisted representation is a bare string (JSON object keys force
// this anyway). Keys that are lexically integers are restored as Live on
// the way back in, which is what keeps the CSV round-trip type-identical.
impl Serialize for TitleKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TitleKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // an empty key is a recording with no title name on record
        Ok(match raw.parse::<u64>() {
            Ok(id) => TitleKey::Live(id),
            Err(_) => TitleKey::Recording(raw),
        })
    }
}

/// Which kind of broadcast unit a raw record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Livestream,
    Video,
}

/// One observed broadcast unit, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub broadcaster_id: u64,
    pub title_key: TitleKey,
    /// Broadcast day as epoch seconds at midnight UTC
    pub date: i64,
    pub views: u64,
    pub is_live: bool,
    pub title: String,
    pub language: String,
}

impl Session {
    /// Builds a session from a raw API record.
    ///
    /// Livestreams and videos use different field names for the same
    /// information (`started_at`/`viewer_count` vs `created_at`/`view_count`),
    /// so the caller has to say which kind it is fetching.
    pub fn from_raw(raw: &RawRecord, kind: SessionKind) -> Result<Self, MalformedRecordError> {
        let is_live = kind == SessionKind::Livestream;
        let (date_field, views_field) = if is_live {
            ("started_at", "viewer_count")
        } else {
            ("created_at", "view_count")
        };

        let id = require_u64(raw, "id")?;
        let broadcaster_id = require_u64(raw, "user_id")?;
        let date = parse_day(require_str(raw, date_field)?, date_field)?;
        let views = require_u64(raw, views_field)?;

        let title_key = if is_live {
            // an empty or absent game_id maps to title id 0, like the source data
            TitleKey::Live(optional_u64(raw, "game_id")?)
        } else {
            TitleKey::Recording(optional_str(raw, "game_name"))
        };

        Ok(Session {
            id,
            broadcaster_id,
            title_key,
            date,
            views,
            is_live,
            title: optional_str(raw, "title"),
            language: optional_str(raw, "language"),
        })
    }

    /// View count this session contributes to its title history entry.
    /// View totals are only tracked for livestreams; videos contribute 0.
    pub fn views_contributed(&self) -> u64 {
        if self.is_live {
            self.views
        } else {
            0
        }
    }
}

/// Truncates an RFC3339-ish timestamp to its calendar day and returns epoch
/// seconds at midnight UTC.
fn parse_day(value: &str, field: &'static str) -> Result<i64, MalformedRecordError> {
    let day = value.split('T').next().unwrap_or(value);
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
        MalformedRecordError::InvalidDate {
            field,
            value: value.to_string(),
        }
    })?;
    // midnight always exists, so the unwrap path is unreachable
    let midnight = date.and_hms_opt(0, 0, 0).ok_or(MalformedRecordError::InvalidDate {
        field,
        value: value.to_string(),
    })?;
    Ok(midnight.and_utc().timestamp())
}

pub(crate) fn require_str<'a>(
    raw: &'a RawRecord,
    field: &'static str,
) -> Result<&'a str, MalformedRecordError> {
    raw.get(field)
        .and_then(|v| v.as_str())
        .ok_or(MalformedRecordError::MissingField { field })
}

/// Integer fields come back from the API as either JSON numbers or decimal
/// strings depending on the endpoint, so both spellings are accepted.
pub(crate) fn require_u64(raw: &RawRecord, field: &'static str) -> Result<u64, MalformedRecordError> {
    let value = raw
        .get(field)
        .ok_or(MalformedRecordError::MissingField { field })?;
    parse_u64_value(value, field)
}

/// Like [`require_u64`] but an absent or empty field maps to 0.
pub(crate) fn optional_u64(raw: &RawRecord, field: &'static str) -> Result<u64, MalformedRecordError> {
    match raw.get(field) {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(0),
        Some(value) => parse_u64_value(value, field),
    }
}

pub(crate) fn optional_str(raw: &RawRecord, field: &'static str) -> String {
    raw.get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_u64_value(
    value: &serde_json::Value,
    field: &'static str,
) -> Result<u64, MalformedRecordError> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(|| {
            MalformedRecordError::InvalidInteger {
                field,
                value: n.to_string(),
            }
        }),
        serde_json::Value::String(s) => {
            s.parse::<u64>()
                .map_err(|_| MalformedRecordError::InvalidInteger {
                    field,
                    value: s.clone(),
                })
        }
        other => Err(MalformedRecordError::InvalidInteger {
            field,
            value: other.to_string(),
        }),
    }
}
