//! Checkpoint persistence with schema versioning
//!
//! [`ProgressStore`] wraps one checkpoint file. Loading never fails: a
//! missing, unreadable or foreign file yields an empty state and a warning,
//! so a damaged checkpoint costs a re-fetch rather than the whole run.

use super::atomic;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Serialize)]
struct CheckpointFileRef<'a, S> {
    schema_version: &'a str,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    state: &'a S,
}

#[derive(Deserialize)]
struct CheckpointFile<S> {
    // Files written before versioning carry no tag and share the current layout.
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(flatten)]
    state: S,
}

/// Crash-safe store for one checkpoint file.
#[derive(Debug, Clone)]
pub struct ProgressStore<S> {
    path: PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> ProgressStore<S>
where
    S: Serialize + DeserializeOwned + Default,
{
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _state: PhantomData,
        }
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file is present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the checkpoint, falling back to an empty state on any problem.
    pub fn load(&self) -> S {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!(path = %self.path.display(), "No checkpoint found, starting fresh");
                S::default()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unusable checkpoint, starting fresh"
                );
                S::default()
            }
        }
    }

    /// Load the checkpoint, reporting why it could not be used.
    pub fn try_load(&self) -> Result<Option<S>, ResumeError> {
        let Some(file) = atomic::read_json::<CheckpointFile<S>>(&self.path)? else {
            return Ok(None);
        };

        match file.schema_version.as_deref() {
            None | Some(SCHEMA_VERSION) => {
                info!(path = %self.path.display(), "Checkpoint loaded");
                Ok(Some(file.state))
            }
            Some(found) => Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: found.to_string(),
            }),
        }
    }

    /// Atomically replace the checkpoint file.
    pub fn save(&self, state: &S) -> Result<(), ResumeError> {
        let file = CheckpointFileRef {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            state,
        };
        atomic::write_json(&self.path, &file)?;
        debug!(path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    /// Delete the checkpoint file.
    pub fn clear(&self) -> Result<(), ResumeError> {
        atomic::remove(&self.path)?;
        info!(path = %self.path.display(), "Checkpoint removed");
        Ok(())
    }
}

/// Errors related to checkpoints, the journal and store files
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Store file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
