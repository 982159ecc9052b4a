//! Error types for backup and restore.

use std::path::PathBuf;

use bugtrack_core::ConfigError;
use thiserror::Error;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Failures that abort a backup or restore call.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{program} failed ({status}): {stderr}")]
    ExternalProcess {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("usage error: {0}")]
    Usage(String),
}
