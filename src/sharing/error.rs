//! Error types for the sharing layer.

use std::path::PathBuf;

use thiserror::Error;

use super::cache::CacheError;
use crate::config::ConfigError;

/// Failures of shared-item operations.
#[derive(Debug, Error)]
pub enum ShareError {
    /// A local file could not be read, written or hashed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The cache refused an operation.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The operation needs the file on local disk.
    #[error("remote file cannot be {action}")]
    RemoteItem {
        /// What was attempted.
        action: &'static str,
    },

    /// A local item lost track of its file.
    #[error("shared item has no local file")]
    NoLocalFile,

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ShareError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
