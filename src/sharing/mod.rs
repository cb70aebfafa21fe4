//! Shared files: identity, publishing and cache integration.
//!
//! A [`FileSharingItem`] describes one file (local, temporary, cached or
//! remote), publishes it to the available transports and starts downloads
//! of it. Items are owned by a [`FileSharingManager`]; collaborators they
//! need (cache, peer network, upload service, HTTP client) are bundled in a
//! [`SharingContext`].

mod advertisement;
mod cache;
mod error;
mod item;
mod manager;
mod upload;

pub use advertisement::{FileDescriptor, ShareAdvertisement};
pub use cache::{
    CacheContent, CacheEntry, CacheError, DiskCache, FILE_TTL, FileCache, META_AMPLITUDES,
    META_LINK, META_THUMB_MT, META_THUMB_URI, META_TYPE, META_URIS, Metadata, TEMP_TTL,
};
pub use error::ShareError;
pub use item::{FileSharingItem, FileType, ItemFlags};
pub use manager::{FileSharingManager, SharingContext};
pub use upload::{HttpUploader, UploadError};
