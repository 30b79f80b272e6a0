//! Work unit parsing and validation
//!
//! A work unit is the fetch granularity of a harvest: either a comma-joined
//! group of station codes (`3195,3196,B278`) or a single five-digit
//! municipality code (`28079`). Once derived from the code files it never
//! changes.

use std::fmt;

/// What a work unit points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkUnitKind {
    /// One or more climatology station codes
    Stations,
    /// A single municipality code for the forecast endpoint
    Municipality,
}

/// Opaque fetch target.
///
/// # Examples
///
/// ```
/// use aemet_harvester::identifier::WorkUnit;
///
/// let unit = WorkUnit::stations("group_1", " 3195, 3196 ").unwrap();
/// assert_eq!(unit.id(), "3195,3196");
/// assert_eq!(unit.station_codes().collect::<Vec<_>>(), vec!["3195", "3196"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    kind: WorkUnitKind,
    id: String,
    label: String,
}

impl WorkUnit {
    /// Parse a comma-joined station group.
    ///
    /// Codes are trimmed; each must be non-empty ASCII alphanumeric.
    pub fn stations(label: impl Into<String>, codes: &str) -> Result<Self, IdentifierError> {
        let label = label.into();
        let mut parsed = Vec::new();
        for code in codes.split(',') {
            let code = code.trim();
            if code.is_empty() {
                return Err(IdentifierError::EmptyCode(label));
            }
            if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(IdentifierError::InvalidCode(code.to_string()));
            }
            parsed.push(code);
        }

        Ok(Self {
            kind: WorkUnitKind::Stations,
            id: parsed.join(","),
            label,
        })
    }

    /// Parse a municipality code (five ASCII digits).
    pub fn municipality(code: &str, town: impl Into<String>) -> Result<Self, IdentifierError> {
        let code = code.trim();
        if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentifierError::InvalidMunicipality(code.to_string()));
        }

        Ok(Self {
            kind: WorkUnitKind::Municipality,
            id: code.to_string(),
            label: town.into(),
        })
    }

    /// Kind of target
    pub fn kind(&self) -> WorkUnitKind {
        self.kind
    }

    /// Canonical identifier, as sent upstream and stored in the journal
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Group name or town name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Station codes of a group; a municipality yields its own code
    pub fn station_codes(&self) -> impl Iterator<Item = &str> {
        self.id.split(',')
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Errors that can occur while parsing a work unit
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// A group contains an empty code
    #[error("empty station code in {0}")]
    EmptyCode(String),

    /// A station code contains unexpected characters
    #[error("invalid station code: {0:?}")]
    InvalidCode(String),

    /// Municipality code is not five digits
    #[error("invalid municipality code: {0:?} (expected five digits)")]
    InvalidMunicipality(String),
}
