//! HTTP upload collaborator used when publishing a file.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Upload failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// No upload service was discovered.
    #[error("HTTP upload service is not available")]
    Unavailable,

    /// The service refused or the transfer broke.
    #[error("{status}")]
    Failed {
        /// Status text reported by the service.
        status: String,
    },
}

/// Uploads a local file to an HTTP upload service.
#[async_trait]
pub trait HttpUploader: Send + Sync {
    /// False when the service is known not to exist.
    fn is_available(&self) -> bool;

    /// Uploads `path` and returns the public download URL.
    ///
    /// Uploaded byte counts are sent to `progress` when given.
    async fn upload(
        &self,
        path: &Path,
        name: &str,
        mime_type: &str,
        progress: Option<mpsc::UnboundedSender<u64>>,
    ) -> Result<String, UploadError>;
}
