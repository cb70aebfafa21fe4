//! Shared collaborators and the item registry.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::advertisement::ShareAdvertisement;
use super::cache::{CacheEntry, FileCache, Metadata};
use super::error::ShareError;
use super::item::FileSharingItem;
use super::upload::HttpUploader;
use crate::config::ShareConfig;
use crate::download::HttpClient;
use crate::peer::{PeerId, PeerNetwork};

/// Collaborators and settings every item of one account shares.
pub struct SharingContext {
    /// Directories and timeouts.
    pub config: ShareConfig,
    /// Content cache.
    pub cache: Arc<dyn FileCache>,
    /// Chat protocol stack.
    pub peers: Arc<dyn PeerNetwork>,
    /// HTTP upload service, when the account has one.
    pub uploader: Option<Arc<dyn HttpUploader>>,
    /// HTTP client used by downloads.
    pub http: HttpClient,
}

impl fmt::Debug for SharingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharingContext")
            .field("config", &self.config)
            .field("has_uploader", &self.uploader.is_some())
            .finish_non_exhaustive()
    }
}

impl SharingContext {
    /// Validates `config` and builds the HTTP client from it.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Config`] for invalid values and
    /// [`ShareError::HttpClient`] if the client cannot be built.
    pub fn new(
        config: ShareConfig,
        cache: Arc<dyn FileCache>,
        peers: Arc<dyn PeerNetwork>,
    ) -> Result<Self, ShareError> {
        config.validate()?;
        let http = HttpClient::from_config(&config)?;
        Ok(Self {
            config,
            cache,
            peers,
            uploader: None,
            http,
        })
    }

    /// Adds an HTTP upload service.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn HttpUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }
}

/// Owns shared items, keyed by the hex of their first hash.
///
/// Releasing an item drops it, which deletes the blob of a temporary share.
#[derive(Debug)]
pub struct FileSharingManager {
    ctx: Arc<SharingContext>,
    items: HashMap<String, FileSharingItem>,
}

impl FileSharingManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(ctx: SharingContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            items: HashMap::new(),
        }
    }

    /// Shared collaborators.
    #[must_use]
    pub fn context(&self) -> &Arc<SharingContext> {
        &self.ctx
    }

    /// Shares a local file by link.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the file cannot be hashed.
    pub fn share_file(&mut self, path: &Path) -> Result<&mut FileSharingItem, ShareError> {
        let item = FileSharingItem::from_file(Arc::clone(&self.ctx), path)?;
        Ok(self.insert(item))
    }

    /// Shares in-memory bytes through a temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the temporary file cannot be written.
    pub fn share_bytes(
        &mut self,
        mime_type: &str,
        data: &[u8],
        metadata: Metadata,
    ) -> Result<&mut FileSharingItem, ShareError> {
        let item = FileSharingItem::from_bytes(Arc::clone(&self.ctx), mime_type, data, metadata)?;
        Ok(self.insert(item))
    }

    /// Shares an encoded PNG image.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the temporary file cannot be written.
    pub fn share_image_png(&mut self, png: &[u8]) -> Result<&mut FileSharingItem, ShareError> {
        let item = FileSharingItem::from_image_png(Arc::clone(&self.ctx), png)?;
        Ok(self.insert(item))
    }

    /// Registers a file advertised by `from`. An already known item is reused.
    pub fn receive_advertisement(
        &mut self,
        advertisement: &ShareAdvertisement,
        from: PeerId,
    ) -> &mut FileSharingItem {
        let item = FileSharingItem::from_advertisement(Arc::clone(&self.ctx), advertisement, from);
        self.insert(item)
    }

    /// Registers an item for an existing cache entry.
    pub fn from_cache(&mut self, entry: &CacheEntry) -> &mut FileSharingItem {
        let item = FileSharingItem::from_cache(Arc::clone(&self.ctx), entry);
        self.insert(item)
    }

    /// Item registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FileSharingItem> {
        self.items.get(key)
    }

    /// Mutable item registered under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut FileSharingItem> {
        self.items.get_mut(key)
    }

    /// Drops the item under `key`. Returns false if there was none.
    pub fn release(&mut self, key: &str) -> bool {
        let released = self.items.remove(key).is_some();
        if released {
            debug!(key, "released shared item");
        }
        released
    }

    /// Number of registered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, item: FileSharingItem) -> &mut FileSharingItem {
        // a duplicate is dropped here, which removes its temporary blob
        self.items.entry(item.key()).or_insert(item)
    }
}
