//! Error journal for work units that failed terminally
//!
//! The journal is a JSON list on disk and is the only record of outstanding
//! failures. Each entry stores the failing URL as a structured field;
//! entries written by older tooling only embed it in the stringified cause,
//! so [`extract_url`] remains as a fallback.

use super::atomic;
use super::state::ResumeError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One failed work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Work unit id (station group or municipality code)
    #[serde(alias = "station_code")]
    pub unit_id: String,
    /// URL that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Stringified cause
    #[serde(alias = "server_response", default)]
    pub cause: String,
    /// When the failure was recorded (RFC 3339)
    #[serde(alias = "fetched_date", default)]
    pub recorded_at: String,
}

impl JournalEntry {
    /// New entry stamped with the current time
    pub fn new(unit_id: impl Into<String>, url: Option<String>, cause: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            url,
            cause: cause.into(),
            recorded_at: Utc::now().to_rfc3339(),
        }
    }

    /// URL to replay: the structured field, else one embedded in the cause
    pub fn failed_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| extract_url(&self.cause))
    }
}

/// Pull the first `http://` or `https://` URL out of free text.
///
/// The URL runs up to the next whitespace; trailing quotes, parentheses and
/// punctuation left over from error formatting are stripped.
pub fn extract_url(text: &str) -> Option<String> {
    let start = [text.find("http://"), text.find("https://")]
        .into_iter()
        .flatten()
        .min()?;

    let tail = &text[start..];
    let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
    let url = tail[..end].trim_end_matches(|c| matches!(c, '"' | '\'' | ')' | '>' | ',' | '.' | ';' | ']'));

    if url.len() > "https://".len() {
        Some(url.to_string())
    } else {
        None
    }
}

/// Append-only failure log backed by one JSON file.
#[derive(Debug, Clone)]
pub struct ErrorJournal {
    path: PathBuf,
}

impl ErrorJournal {
    /// Journal backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries. A missing file or a document that is not a list is empty.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, ResumeError> {
        let Some(raw) = atomic::read_json::<Value>(&self.path)? else {
            return Ok(Vec::new());
        };

        let Value::Array(items) = raw else {
            warn!(path = %self.path.display(), "Error journal is not a list, treating as empty");
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<JournalEntry>(item) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(index, error = %e, "Skipping unreadable journal entry"),
            }
        }
        Ok(entries)
    }

    /// Number of outstanding entries
    pub fn len(&self) -> Result<usize, ResumeError> {
        Ok(self.entries()?.len())
    }

    /// Whether no failure is outstanding
    pub fn is_empty(&self) -> Result<bool, ResumeError> {
        Ok(self.len()? == 0)
    }

    /// Load the list (or start one), append `entry` and rewrite the file.
    pub fn append(&self, entry: JournalEntry) -> Result<(), ResumeError> {
        let mut entries = match self.entries() {
            Ok(entries) => entries,
            Err(ResumeError::DeserializationError(e)) => {
                self.quarantine(&e)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        info!(
            unit = %entry.unit_id,
            url = entry.url.as_deref().unwrap_or("-"),
            path = %self.path.display(),
            "Recording failure in error journal"
        );
        entries.push(entry);
        atomic::write_json(&self.path, &entries)
    }

    /// Distinct replayable URLs, in journal order.
    pub fn list_failed_urls(&self) -> Result<Vec<String>, ResumeError> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for entry in self.entries()? {
            match entry.failed_url() {
                Some(url) => {
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
                None => warn!(unit = %entry.unit_id, "Journal entry has no replayable URL"),
            }
        }
        Ok(urls)
    }

    /// Empty the journal.
    pub fn clear(&self) -> Result<(), ResumeError> {
        atomic::write_json(&self.path, &Vec::<JournalEntry>::new())?;
        info!(path = %self.path.display(), "Error journal cleared");
        Ok(())
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Returns the number of entries removed.
    pub fn retain(&self, mut keep: impl FnMut(&JournalEntry) -> bool) -> Result<usize, ResumeError> {
        let entries = self.entries()?;
        let before = entries.len();
        let kept: Vec<JournalEntry> = entries.into_iter().filter(|e| keep(e)).collect();
        let removed = before - kept.len();

        if removed > 0 {
            atomic::write_json(&self.path, &kept)?;
        }
        Ok(removed)
    }

    fn quarantine(&self, reason: &str) -> Result<(), ResumeError> {
        let backup = self
            .path
            .with_extension(format!("corrupt-{}.json", Utc::now().format("%Y%m%dT%H%M%S")));
        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            error = %reason,
            "Error journal unreadable, moving it aside"
        );
        std::fs::rename(&self.path, &backup).map_err(|e| ResumeError::IoError(e.to_string()))
    }
}
