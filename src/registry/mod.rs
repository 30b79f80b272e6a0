//! Code files that define the work units of a harvest
//!
//! Three JSON objects drive every run, all read in file order:
//!
//! - `ema_codes.json`: `{station name: code}`, the discovered station catalog
//! - `codes_group.json`: `{group name: "c1,c2,..."}`, built from the catalog
//! - `towns_codes.json`: `{municipality code: town name}`

use crate::identifier::{WorkUnit, WorkUnitKind};
use crate::resume::atomic;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Prefix of generated group names (`grupo_1`, `grupo_2`, ...)
pub const GROUP_PREFIX: &str = "grupo_";

/// Errors raised while reading or writing code files
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Code file does not exist
    #[error("code file not found: {0}")]
    NotFound(String),

    /// Code file is not valid JSON
    #[error("parse error: {0}")]
    ParseError(String),

    /// An entry has the wrong shape or an invalid code
    #[error("invalid entry {key:?}: {reason}")]
    InvalidEntry {
        /// Offending key
        key: String,
        /// What was wrong
        reason: String,
    },

    /// Code file holds no entries
    #[error("code file {0} is empty")]
    Empty(String),

    /// Read or write failure
    #[error("IO error: {0}")]
    Io(String),
}

fn load_code_map(path: &Path) -> Result<Map<String, Value>, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| RegistryError::Io(format!("Failed to read {}: {e}", path.display())))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| RegistryError::ParseError(format!("{}: {e}", path.display())))?;

    match value {
        Value::Object(map) if map.is_empty() => Err(RegistryError::Empty(path.display().to_string())),
        Value::Object(map) => Ok(map),
        _ => Err(RegistryError::ParseError(format!(
            "{}: expected a JSON object",
            path.display()
        ))),
    }
}

fn code_text(key: &str, value: &Value) -> Result<String, RegistryError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(RegistryError::InvalidEntry {
            key: key.to_string(),
            reason: "expected a string".to_string(),
        }),
    }
}

/// Load station groups as work units, in file order.
///
/// # Errors
/// Fails if the file is missing, malformed, empty, or any group holds an
/// invalid code.
pub fn load_station_groups(path: &Path) -> Result<Vec<WorkUnit>, RegistryError> {
    let map = load_code_map(path)?;
    let units = map
        .iter()
        .map(|(group, codes)| {
            let codes = code_text(group, codes)?;
            WorkUnit::stations(group.as_str(), &codes).map_err(|e| RegistryError::InvalidEntry {
                key: group.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(groups = units.len(), path = %path.display(), "Loaded station groups");
    Ok(units)
}

/// Load municipality codes as work units, in file order.
pub fn load_towns(path: &Path) -> Result<Vec<WorkUnit>, RegistryError> {
    let map = load_code_map(path)?;
    let units = map
        .iter()
        .map(|(code, town)| {
            let town = code_text(code, town)?;
            WorkUnit::municipality(code, town).map_err(|e| RegistryError::InvalidEntry {
                key: code.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(towns = units.len(), path = %path.display(), "Loaded municipality codes");
    Ok(units)
}

/// Station codes of the catalog, in file order.
pub fn load_station_catalog(path: &Path) -> Result<Vec<String>, RegistryError> {
    let map = load_code_map(path)?;
    map.iter()
        .map(|(name, code)| {
            let code = code_text(name, code)?;
            if code.trim().is_empty() {
                return Err(RegistryError::InvalidEntry {
                    key: name.clone(),
                    reason: "empty station code".to_string(),
                });
            }
            Ok(code.trim().to_string())
        })
        .collect()
}

/// Split codes into comma-joined groups of `size`, named `grupo_N`.
///
/// ```
/// use aemet_harvester::registry::group_station_codes;
///
/// let codes: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
/// let groups = group_station_codes(&codes, 2);
/// assert_eq!(groups["grupo_1"], "a,b");
/// assert_eq!(groups["grupo_2"], "c");
/// ```
pub fn group_station_codes(codes: &[String], size: usize) -> Map<String, Value> {
    codes
        .chunks(size.max(1))
        .enumerate()
        .map(|(i, chunk)| {
            (
                format!("{GROUP_PREFIX}{}", i + 1),
                Value::String(chunk.join(",")),
            )
        })
        .collect()
}

/// Write work units back in the shape of the code file they came from.
///
/// Station groups become `{group: "c1,c2"}`, municipalities `{code: town}`.
pub fn write_code_file(path: &Path, units: &[WorkUnit]) -> Result<(), RegistryError> {
    let map: Map<String, Value> = units
        .iter()
        .map(|unit| match unit.kind() {
            WorkUnitKind::Stations => (unit.label().to_string(), Value::String(unit.id().to_string())),
            WorkUnitKind::Municipality => {
                (unit.id().to_string(), Value::String(unit.label().to_string()))
            }
        })
        .collect();
    write_map(path, &map)
}

/// Atomically write a code map.
pub fn write_map(path: &Path, map: &Map<String, Value>) -> Result<(), RegistryError> {
    atomic::write_json(path, map).map_err(|e| RegistryError::Io(e.to_string()))
}
