//! Error types for the download module.
//!
//! These describe why a download session ended without success. The
//! controller records the most recent transport error text separately
//! (see [`FileShareDownloader::last_error`](super::FileShareDownloader::last_error)).

use std::path::PathBuf;

use thiserror::Error;

/// Terminal failures of a download session.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every source was tried (or none was given) without success.
    #[error("no usable download source: {last_error}")]
    SourceExhausted {
        /// Error of the last transport attempted, or a generic message.
        last_error: String,
    },

    /// A transport failed before it reported metadata.
    ///
    /// The controller recovers from this by trying the next source; it only
    /// surfaces through [`SourceExhausted`](Self::SourceExhausted).
    #[error("handshake with {uri} failed: {reason}")]
    TransportHandshakeFailed {
        /// Source that failed.
        uri: String,
        /// Transport error text.
        reason: String,
    },

    /// A transport failed after metadata was reported. Fatal to the session.
    #[error("transfer from {uri} failed: {reason}")]
    TransportStreamFailed {
        /// Source that failed.
        uri: String,
        /// Transport error text.
        reason: String,
    },

    /// The staging or destination file could not be opened, written or promoted.
    #[error("IO error writing to {path}: {source}")]
    LocalStorageFailed {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The source URI has no matching transport.
    #[error("unsupported download source: {uri}")]
    UnsupportedSource {
        /// The rejected URI.
        uri: String,
    },

    /// The caller aborted the download.
    #[error("download aborted")]
    Aborted,
}

impl DownloadError {
    /// Creates a source exhaustion error.
    pub fn source_exhausted(last_error: impl Into<String>) -> Self {
        Self::SourceExhausted {
            last_error: last_error.into(),
        }
    }

    /// Creates a pre-metadata transport error.
    pub fn handshake_failed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportHandshakeFailed {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Creates a post-metadata transport error.
    pub fn stream_failed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportStreamFailed {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Creates a local storage error.
    pub fn local_storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalStorageFailed {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsupported source error.
    pub fn unsupported_source(uri: impl Into<String>) -> Self {
        Self::UnsupportedSource { uri: uri.into() }
    }

    /// True when the session could have continued with another source.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportHandshakeFailed { .. } | Self::UnsupportedSource { .. }
        )
    }
}

// No From<std::io::Error>: every storage error needs the path it happened on.
