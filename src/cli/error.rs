//! CLI error types and conversions

use crate::harvest::HarvestError;
use crate::output::OutputError;
use crate::registry::RegistryError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Code file error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Harvest could not run
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Harvest finished without any stored data
    #[error("{0} harvest produced no data")]
    NoData(&'static str),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
