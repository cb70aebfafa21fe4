//! Content cache collaborator: blobs stored by content identity with a TTL.
//!
//! [`FileCache`] is the interface the sharing layer needs. [`DiskCache`] is a
//! plain directory implementation that keeps one blob per identity and a
//! JSON index record per hash next to it.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::identity::{ContentHash, ContentIdentity};

/// Free-form metadata attached to cache entries.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Media type of the content.
pub const META_TYPE: &str = "type";
/// External path of a linked file; absent for managed blobs.
pub const META_LINK: &str = "link";
/// Published source URIs.
pub const META_URIS: &str = "uris";
/// Media type of the thumbnail.
pub const META_THUMB_MT: &str = "thumb-mt";
/// URI of the thumbnail.
pub const META_THUMB_URI: &str = "thumb-uri";
/// Audio amplitude envelope.
pub const META_AMPLITUDES: &str = "amplitudes";

/// Lifetime of temporary shares adopted by the cache (7 days).
pub const TEMP_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Lifetime of regular files and links (365 days).
pub const FILE_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// One cached file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hashes of the stored content.
    pub identity: ContentIdentity,
    /// Metadata recorded with the entry.
    pub metadata: Metadata,
    /// Stored size in bytes.
    pub size: u64,
    /// Blob file name, relative to the cache directory.
    pub file_name: String,
}

impl CacheEntry {
    /// String value of a metadata key.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Content handed to [`FileCache::store`].
#[derive(Debug, Clone, Copy)]
pub enum CacheContent<'a> {
    /// Bytes to write.
    Bytes(&'a [u8]),
    /// File to move into the cache.
    MoveFrom(&'a Path),
}

/// Cache failures.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A blob or index file could not be read or written.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An index record could not be encoded.
    #[error("cache index error: {0}")]
    Index(#[from] serde_json::Error),

    /// Entries need at least one hash to be addressable.
    #[error("cannot cache content without a hash")]
    EmptyIdentity,
}

impl CacheError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Store and retrieve files by content identity.
pub trait FileCache: Send + Sync {
    /// Finds an entry matching any hash of `identity`.
    fn lookup(&self, identity: &ContentIdentity) -> Option<CacheEntry>;

    /// Stores `content` under `identity`, replacing an existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be written or moved.
    fn store(
        &self,
        identity: &ContentIdentity,
        content: CacheContent<'_>,
        metadata: Metadata,
        ttl: Duration,
    ) -> Result<CacheEntry, CacheError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    entry: CacheEntry,
    expires_at: u64,
}

/// Directory-backed cache.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Creates a cache rooted at `dir`. The directory is created on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", hash.algorithm, hash.to_hex()))
    }

    fn read_record(&self, hash: &ContentHash) -> Option<IndexRecord> {
        let raw = fs::read_to_string(self.index_path(hash)).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl FileCache for DiskCache {
    fn lookup(&self, identity: &ContentIdentity) -> Option<CacheEntry> {
        let now = unix_now();
        identity
            .iter()
            .filter_map(|hash| self.read_record(hash))
            .find(|record| record.expires_at > now && self.dir.join(&record.entry.file_name).exists())
            .map(|record| record.entry)
    }

    #[instrument(level = "debug", skip(self, content, metadata), fields(hash = %identity.primary_hex()))]
    fn store(
        &self,
        identity: &ContentIdentity,
        content: CacheContent<'_>,
        metadata: Metadata,
        ttl: Duration,
    ) -> Result<CacheEntry, CacheError> {
        if identity.is_empty() {
            return Err(CacheError::EmptyIdentity);
        }
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let file_name = identity.primary_hex();
        let target = self.dir.join(&file_name);
        match content {
            CacheContent::Bytes(bytes) => {
                fs::write(&target, bytes).map_err(|e| CacheError::io(&target, e))?;
            }
            CacheContent::MoveFrom(source) => move_file(source, &target)?,
        }
        let size = fs::metadata(&target)
            .map_err(|e| CacheError::io(&target, e))?
            .len();

        let entry = CacheEntry {
            identity: identity.clone(),
            metadata,
            size,
            file_name,
        };
        let record = IndexRecord {
            entry,
            expires_at: unix_now().saturating_add(ttl.as_secs()),
        };
        let encoded = serde_json::to_string_pretty(&record)?;
        for hash in identity {
            let path = self.index_path(hash);
            fs::write(&path, &encoded).map_err(|e| CacheError::io(&path, e))?;
        }
        debug!(size, "stored cache entry");
        Ok(record.entry)
    }
}

/// Renames `source` onto `target`, copying when they are on different filesystems.
fn move_file(source: &Path, target: &Path) -> Result<(), CacheError> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(source, target).map_err(|e| CacheError::io(target, e))?;
            fs::remove_file(source).map_err(|e| CacheError::io(source, e))
        }
        Err(e) => Err(CacheError::io(source, e)),
    }
}
