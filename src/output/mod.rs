//! Durable outputs and file layout

use crate::resume::ResumeError;

pub mod dataset;
pub mod path;

pub use dataset::DatasetFile;
pub use path::DataLayout;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Existing dataset could not be read back
    #[error("dataset {path} is unreadable: {reason}")]
    Corrupt {
        /// Dataset path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Store write failure
    #[error("store error: {0}")]
    Store(#[from] ResumeError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
