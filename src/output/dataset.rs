//! Durable dataset files
//!
//! Unlike checkpoints, a durable dataset that cannot be parsed is an error:
//! rewriting it from an empty state would discard everything harvested so far.

use super::{OutputError, OutputResult};
use crate::resume::atomic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::info;

/// One durable JSON dataset (`weather_data.json`, `prediction_data.json`).
#[derive(Debug, Clone)]
pub struct DatasetFile<T> {
    path: PathBuf,
    _data: PhantomData<fn() -> T>,
}

impl<T> DatasetFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Dataset backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _data: PhantomData,
        }
    }

    /// Dataset file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the dataset; a missing file is an empty dataset.
    pub fn load(&self) -> OutputResult<T> {
        match atomic::read_json::<T>(&self.path) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Ok(T::default()),
            Err(e) => Err(OutputError::Corrupt {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Atomically replace the dataset file.
    pub fn save(&self, data: &T) -> OutputResult<()> {
        atomic::write_json(&self.path, data)?;
        info!(path = %self.path.display(), "Dataset written");
        Ok(())
    }
}
