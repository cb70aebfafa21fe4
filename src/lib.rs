//! File sharing core library
//!
//! This library shares files between chat peers: it describes files by
//! content hash, advertises them over several transports and downloads them
//! by trying those transports in priority order.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`identity`] - Content hashes naming a file's bytes
//! - [`source`] - Source URI classification and priority ordering
//! - [`peer`] - Peer addresses and the chat protocol collaborator
//! - [`download`] - Sequential-fallback download engine and transports
//! - [`sharing`] - Shared items, cache integration and publishing
//! - [`config`] - Directories and HTTP timeouts

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod identity;
pub mod peer;
pub mod sharing;
pub mod source;

// Re-export commonly used types
pub use config::{ConfigError, ShareConfig};
pub use download::{
    ByteRange, DownloadError, DownloadEvent, DownloadOutcome, DownloadRequest,
    FileShareDownloader, HttpClient,
};
pub use identity::{ContentHash, ContentIdentity, HashAlgorithm};
pub use peer::{OfflinePeers, PeerError, PeerId, PeerNetwork};
pub use sharing::{
    DiskCache, FileCache, FileSharingItem, FileSharingManager, FileType, ShareAdvertisement,
    ShareError, SharingContext,
};
pub use source::{SourceKind, SourceUri, attempt_order, simple_source, sort_sources_by_priority};
