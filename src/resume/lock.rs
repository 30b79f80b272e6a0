//! Advisory file locking for checkpoint, journal and dataset files
//!
//! Every store file `foo.json` is guarded by a sibling `foo.lock` taken with
//! fd-lock: exclusive for rewrites, shared for reads.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How the lock is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers may share the lock
    Shared,
    /// Single writer
    Exclusive,
}

/// Path of the lock file guarding `path`
pub fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn open_lock_file(path: &Path) -> Result<File, ResumeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))
}

/// Run `f` while holding the lock that guards `path`.
///
/// Blocks until the lock is available. The lock is released when `f`
/// returns.
pub fn with_lock<T>(
    path: &Path,
    mode: LockMode,
    f: impl FnOnce() -> Result<T, ResumeError>,
) -> Result<T, ResumeError> {
    let mut lock = RwLock::new(open_lock_file(path)?);
    debug!(path = %path.display(), mode = ?mode, "Acquiring store lock");

    match mode {
        LockMode::Shared => {
            let _guard = lock
                .read()
                .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;
            f()
        }
        LockMode::Exclusive => {
            let _guard = lock
                .write()
                .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;
            f()
        }
    }
}
