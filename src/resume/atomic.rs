//! Atomic whole-file JSON persistence
//!
//! Writes go to a temporary file in the target directory, are flushed and
//! fsynced, then renamed over the target; the parent directory is fsynced
//! afterwards so the rename itself survives a crash.

use super::lock::{lock_path, with_lock, LockMode};
use super::state::ResumeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Largest store file that will be read back (512 MiB)
pub const MAX_STORE_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ResumeError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

    with_lock(path, LockMode::Exclusive, || write_bytes(path, &json))?;

    debug!(path = %path.display(), bytes = json.len(), "Store file written");
    Ok(())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), ResumeError> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

    if let Err(e) = sync_dir(parent_dir) {
        warn!(path = %parent_dir.display(), error = %e, "Failed to sync parent directory after rename");
    }
    Ok(())
}

/// Fsync a directory so a rename inside it is durable.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

/// Read and deserialize `path`. Returns `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ResumeError> {
    if !path.exists() {
        return Ok(None);
    }

    with_lock(path, LockMode::Shared, || {
        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STORE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STORE_FILE_SIZE,
            });
        }

        let contents = std::fs::read(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))
    })
}

/// Delete `path` and its lock file. Missing files are not an error.
pub fn remove(path: &Path) -> Result<(), ResumeError> {
    for target in [path.to_path_buf(), lock_path(path)] {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ResumeError::IoError(e.to_string())),
        }
    }
    Ok(())
}
