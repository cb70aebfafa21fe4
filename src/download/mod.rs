//! Multi-source download engine with sequential fallback.
//!
//! A download session tries the sources of one file in priority order
//! (peer-stream, store-and-forward, FTP, HTTP), driving one transport at a
//! time and streaming bytes into a staging file next to the destination.
//!
//! # Features
//!
//! - HTTP range requests with `Content-Range` handling
//! - Peer-stream sessions and store-and-forward blobs through [`crate::peer::PeerNetwork`]
//! - Fallback to the next source while no metadata has been reported
//! - Destination deconfliction (`name-1.ext`, `name-2.ext`, ...)
//! - Structured error types with full context

mod client;
pub mod constants;
mod downloader;
mod error;
pub mod filename;
mod range;
mod transport;

pub use client::HttpClient;
pub use downloader::{DownloadEvent, DownloadOutcome, DownloadRequest, FileShareDownloader};
pub use error::DownloadError;
pub use range::{ByteRange, parse_content_range};
pub use transport::TransportEvent;

// No module-local Result alias: use `Result<T, DownloadError>` explicitly.
