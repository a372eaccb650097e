//! CSV persistence for the tracked population.
//!
//! One row per broadcaster: the scalar profile fields plus three columns
//! holding the sample/history sequences as JSON text blobs. Loading
//! restores title-history keys to their proper kind (lexically-integer
//! keys become live title ids again), so a save/load cycle is
//! type-identical to the original population.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::tracking::{
    AudienceSample, Broadcaster, FollowerSample, Population, TitleHistoryEntry, TitleKey,
};

/// Column order of the population CSV.
const COLUMNS: [&str; 9] = [
    "id",
    "login",
    "display_name",
    "profile_image_url",
    "description",
    "language",
    "audience_samples",
    "follower_samples",
    "title_history",
];

/// Errors for population save/load.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error when reading or writing the file
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but does not look like a population CSV
    #[error("Invalid CSV format: {reason}")]
    InvalidFormat { reason: String },

    /// A row is missing one of the expected columns
    #[error("Row {row} is missing column '{column}'")]
    MissingColumn { row: usize, column: &'static str },

    /// A scalar column failed to parse
    #[error("Row {row}: column '{column}' is not a valid integer: {value}")]
    InvalidInteger {
        row: usize,
        column: &'static str,
        value: String,
    },

    /// A JSON blob column failed to parse
    #[error("Row {row}: column '{column}' holds malformed JSON: {source}")]
    JsonParse {
        row: usize,
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes the population to `path`, one row per broadcaster in id order.
pub fn save_population(population: &Population, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let mut out = String::new();
    out.push_str(&COLUMNS.join(","));
    out.push('\n');

    for (_, broadcaster) in population.iter() {
        let audience = serde_json::to_string(&broadcaster.audience_samples)
            .expect("audience samples always serialize");
        let followers = serde_json::to_string(&broadcaster.follower_samples)
            .expect("follower samples always serialize");
        let history = serde_json::to_string(&broadcaster.title_history)
            .expect("title history always serializes");

        let fields = [
            broadcaster.id.to_string(),
            broadcaster.login.clone(),
            broadcaster.display_name.clone(),
            broadcaster.profile_image_url.clone(),
            broadcaster.description.clone(),
            broadcaster.language.clone(),
            audience,
            followers,
            history,
        ];
        let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out)?;
    info!(path = %path.display(), broadcasters = population.len(), "population saved");
    Ok(())
}

/// Loads a population from `path`. The file must exist; use
/// [`load_population_or_default`] when a missing file should just mean an
/// empty population.
pub fn load_population(path: impl AsRef<Path>) -> Result<Population, StoreError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let records = parse_csv(&content);

    let mut rows = records.into_iter();
    let header = rows.next().ok_or_else(|| StoreError::InvalidFormat {
        reason: "file is empty".to_string(),
    })?;

    // column positions come from the header row, so extra columns or a
    // different ordering in hand-edited files still load
    let mut indices = [0usize; COLUMNS.len()];
    for (slot, column) in indices.iter_mut().zip(COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| StoreError::InvalidFormat {
                reason: format!("header is missing column '{}'", column),
            })?;
    }

    let mut population = Population::new();
    for (row_number, row) in rows.enumerate() {
        // a trailing newline produces one empty record; skip it
        if row.len() == 1 && row[0].is_empty() {
            continue;
        }
        let broadcaster = parse_row(&row, &indices, row_number + 2)?;
        population.insert(broadcaster);
    }

    info!(path = %path.display(), broadcasters = population.len(), "population loaded");
    Ok(population)
}

/// Like [`load_population`], but a missing file is reported and replaced by
/// an empty population instead of failing — a fresh deployment simply has
/// nothing on disk yet.
pub fn load_population_or_default(path: impl AsRef<Path>) -> Result<Population, StoreError> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "population file does not exist yet, starting empty");
        return Ok(Population::new());
    }
    load_population(path)
}

fn parse_row(
    row: &[String],
    indices: &[usize; COLUMNS.len()],
    row_number: usize,
) -> Result<Broadcaster, StoreError> {
    let field = |slot: usize| -> Result<&str, StoreError> {
        row.get(indices[slot])
            .map(|s| s.as_str())
            .ok_or(StoreError::MissingColumn {
                row: row_number,
                column: COLUMNS[slot],
            })
    };

    let id_raw = field(0)?;
    let id = id_raw.parse::<u64>().map_err(|_| StoreError::InvalidInteger {
        row: row_number,
        column: "id",
        value: id_raw.to_string(),
    })?;

    let audience_samples: Vec<AudienceSample> =
        parse_blob(field(6)?, "audience_samples", row_number)?;
    let follower_samples: Vec<FollowerSample> =
        parse_blob(field(7)?, "follower_samples", row_number)?;
    let title_history: BTreeMap<TitleKey, TitleHistoryEntry> =
        parse_blob(field(8)?, "title_history", row_number)?;

    let mut broadcaster = Broadcaster::new(id);
    broadcaster.login = field(1)?.to_string();
    broadcaster.display_name = field(2)?.to_string();
    broadcaster.profile_image_url = field(3)?.to_string();
    broadcaster.description = field(4)?.to_string();
    broadcaster.language = field(5)?.to_string();
    broadcaster.audience_samples = audience_samples;
    broadcaster.follower_samples = follower_samples;
    broadcaster.title_history = title_history;
    broadcaster.rebuild_recent_activity();
    Ok(broadcaster)
}

fn parse_blob<T: serde::de::DeserializeOwned>(
    raw: &str,
    column: &'static str,
    row_number: usize,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::JsonParse {
        row: row_number,
        column,
        source,
    })
}

/// Quotes a field when it contains a delimiter, quote or line break.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Minimal quoted-CSV reader matching what [`escape_csv_field`] emits:
/// `""` escapes inside quoted fields, line breaks allowed inside quotes.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {} // swallowed; the following \n terminates the record
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    // file without a trailing newline still yields its last record
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}
