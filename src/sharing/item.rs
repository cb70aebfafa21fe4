//! One shareable file: identity, state flags, publish and download.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::advertisement::{FileDescriptor, ShareAdvertisement};
use super::cache::{
    CacheContent, CacheEntry, FILE_TTL, META_AMPLITUDES, META_LINK, META_THUMB_MT,
    META_THUMB_URI, META_TYPE, META_URIS, Metadata, TEMP_TTL,
};
use super::error::ShareError;
use super::manager::SharingContext;
use crate::download::filename::{content_type_from_path, extension_from_content_type};
use crate::download::{ByteRange, DownloadOutcome, DownloadRequest, FileShareDownloader};
use crate::identity::ContentIdentity;
use crate::peer::PeerId;
use crate::source::{PEER_STREAM_QUERY, attempt_order, simple_source};

/// Prefix of temporary blobs and generated display names.
const SHARE_PREFIX: &str = "share-";

/// Where the bytes of an item live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Managed blob inside the cache directory.
    LocalFile,
    /// File outside the cache, referenced by path.
    LocalLink,
    /// Temporary blob owned by the item until the cache adopts it.
    TempFile,
    /// Known only from an advertisement; not on local disk.
    RemoteFile,
}

/// Item state flags.
///
/// The two publish flags are independent: publishing completes once both
/// are set, whether or not each path succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFlags {
    /// The size is known.
    pub size_known: bool,
    /// The cache already recorded the publish result.
    pub publish_notified: bool,
    /// HTTP upload finished (or is unavailable).
    pub http_finished: bool,
    /// Peer-stream announcement finished.
    pub peer_stream_finished: bool,
}

/// A file that can be shared with peers or downloaded from them.
#[derive(Debug)]
pub struct FileSharingItem {
    ctx: Arc<SharingContext>,
    file_type: FileType,
    flags: ItemFlags,
    identity: ContentIdentity,
    path: Option<PathBuf>,
    name: Option<String>,
    size: u64,
    mime_type: String,
    modified: Option<SystemTime>,
    description: Option<String>,
    metadata: Metadata,
    sources: Vec<String>,
    peers: Vec<PeerId>,
    log: Vec<String>,
    tracked: Option<oneshot::Receiver<DownloadOutcome>>,
    progress: Option<mpsc::UnboundedSender<u64>>,
}

impl FileSharingItem {
    fn empty(ctx: Arc<SharingContext>, file_type: FileType, identity: ContentIdentity) -> Self {
        Self {
            ctx,
            file_type,
            flags: ItemFlags::default(),
            identity,
            path: None,
            name: None,
            size: 0,
            mime_type: String::new(),
            modified: None,
            description: None,
            metadata: Metadata::new(),
            sources: Vec::new(),
            peers: Vec::new(),
            log: Vec::new(),
            tracked: None,
            progress: None,
        }
    }

    /// Item for an existing cache entry.
    #[must_use]
    pub fn from_cache(ctx: Arc<SharingContext>, entry: &CacheEntry) -> Self {
        let mut item = Self::empty(ctx, FileType::LocalFile, entry.identity.clone());
        item.init_from_entry(entry);
        item
    }

    /// Item for a file advertised by `from`.
    ///
    /// If the cache already holds content with a matching hash the item is
    /// local; otherwise it is a [`FileType::RemoteFile`] whose only peer
    /// candidate is the sender.
    #[must_use]
    pub fn from_advertisement(
        ctx: Arc<SharingContext>,
        advertisement: &ShareAdvertisement,
        from: PeerId,
    ) -> Self {
        let file = &advertisement.file;
        let mut item = Self::empty(ctx, FileType::RemoteFile, file.hashes.clone());
        item.peers = vec![from];
        if item.init_from_cache() {
            return item;
        }

        if let Some(size) = file.size {
            item.flags.size_known = true;
            item.size = size;
        }
        item.name.clone_from(&file.name);
        item.mime_type = file.mime_type.clone().unwrap_or_default();
        item.modified = file.modified;
        item.description.clone_from(&file.description);
        item.sources.clone_from(&advertisement.sources);
        if let Some(amplitudes) = file.amplitudes.as_ref().filter(|a| !a.is_empty()) {
            item.metadata
                .insert(META_AMPLITUDES.to_string(), Value::from(amplitudes.clone()));
        }
        item
    }

    /// Item for an encoded PNG image, stored in a temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the temporary file cannot be written.
    pub fn from_image_png(ctx: Arc<SharingContext>, png: &[u8]) -> Result<Self, ShareError> {
        let mut item = Self::from_bytes(ctx, "image/png", png, Metadata::new())?;
        item.modified = None;
        Ok(item)
    }

    /// Item linking a local file.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the file cannot be read.
    pub fn from_file(ctx: Arc<SharingContext>, path: impl Into<PathBuf>) -> Result<Self, ShareError> {
        let path = path.into();
        let identity = ContentIdentity::of_file(&path).map_err(|e| ShareError::io(&path, e))?;
        let mut item = Self::empty(ctx, FileType::LocalLink, identity);
        item.flags.size_known = true;
        if !item.init_from_cache() {
            let meta = fs::metadata(&path).map_err(|e| ShareError::io(&path, e))?;
            item.size = meta.len();
            item.modified = meta.modified().ok();
            item.mime_type = content_type_from_path(&path).to_string();
            item.path = Some(path);
        }
        Ok(item)
    }

    /// Item for in-memory bytes, stored in a temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Io`] if the temporary file cannot be written.
    pub fn from_bytes(
        ctx: Arc<SharingContext>,
        mime_type: &str,
        data: &[u8],
        metadata: Metadata,
    ) -> Result<Self, ShareError> {
        let mut item = Self::empty(ctx, FileType::TempFile, ContentIdentity::of_bytes(data));
        item.flags.size_known = true;
        item.modified = Some(SystemTime::now());
        item.metadata = metadata;
        if !item.init_from_cache() {
            item.mime_type = mime_type.to_string();
            item.size = data.len() as u64;
            let suffix = extension_from_content_type(mime_type)
                .map(|ext| format!(".{ext}"))
                .unwrap_or_default();
            let temp_dir = item.ctx.config.temp_dir.clone();
            item.path = Some(write_temp_blob(&temp_dir, &suffix, data)?);
        }
        Ok(item)
    }

    fn init_from_cache(&mut self) -> bool {
        if self.identity.is_empty() {
            return false;
        }
        match self.ctx.cache.lookup(&self.identity) {
            Some(entry) => {
                self.init_from_entry(&entry);
                true
            }
            None => false,
        }
    }

    fn init_from_entry(&mut self, entry: &CacheEntry) {
        self.flags = ItemFlags {
            size_known: true,
            publish_notified: true,
            ..ItemFlags::default()
        };
        self.mime_type = entry.meta_str(META_TYPE).unwrap_or_default().to_string();
        match entry.meta_str(META_LINK).filter(|link| !link.is_empty()) {
            None => {
                self.file_type = FileType::LocalFile;
                self.path = Some(self.ctx.config.cache_dir.join(&entry.file_name));
                self.size = entry.size;
            }
            Some(link) => {
                self.file_type = FileType::LocalLink;
                self.size = fs::metadata(link).map_or(0, |m| m.len());
                self.path = Some(PathBuf::from(link));
            }
        }
        self.identity = entry.identity.clone();
        self.sources = entry
            .metadata
            .get(META_URIS)
            .and_then(Value::as_array)
            .map(|uris| {
                uris.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        for uri in &self.sources {
            let Ok(url) = Url::parse(uri) else {
                continue;
            };
            if url.scheme().starts_with("http") {
                self.flags.http_finished = true;
            } else if url.scheme() == "xmpp" {
                self.flags.peer_stream_finished = true;
            }
        }
    }

    /// Registry key: hex of the first hash.
    #[must_use]
    pub fn key(&self) -> String {
        self.identity.primary_hex()
    }

    /// Storage kind.
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// State flags.
    #[must_use]
    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    /// Content hashes.
    #[must_use]
    pub fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    /// Local path; `None` for remote files.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size, when known.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.flags.size_known.then_some(self.size)
    }

    /// Media type; empty when unknown.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Source URIs in the order they were collected.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Peers that may serve this file.
    #[must_use]
    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    /// Passthrough metadata (thumbnail reference, amplitudes).
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// User-visible publish log.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Sets the description sent with advertisements.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Forwards upload progress (bytes sent) to `progress` during publish.
    pub fn set_publish_progress(&mut self, progress: mpsc::UnboundedSender<u64>) {
        self.progress = Some(progress);
    }

    /// Name shown to users: the advertised name, the file name of the
    /// local path, or `share-<hash>.<ext>` when neither exists.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(file_name) = self.path.as_deref().and_then(Path::file_name) {
            return file_name.to_string_lossy().into_owned();
        }
        let hex = self.identity.primary_hex();
        match extension_from_content_type(&self.mime_type) {
            Some(ext) => format!("{SHARE_PREFIX}{hex}.{ext}"),
            None => format!("{SHARE_PREFIX}{hex}"),
        }
    }

    /// Highest priority source, only if a media backend can stream it directly.
    #[must_use]
    pub fn simple_source(&self) -> Option<Url> {
        simple_source(&self.sources)
    }

    /// Publishes the file on every transport and records the result in the cache.
    ///
    /// The HTTP upload runs when an upload service is available; the
    /// peer-stream source needs no preparation. Once both are finished the
    /// cache adopts a temporary blob (7-day TTL) or records a link (365-day TTL).
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::RemoteItem`] for remote files, or the cache
    /// error if the result cannot be recorded.
    #[instrument(skip(self), fields(name = %self.display_name()))]
    pub async fn publish(&mut self) -> Result<(), ShareError> {
        if self.file_type == FileType::RemoteFile {
            return Err(ShareError::RemoteItem {
                action: "published",
            });
        }

        if !self.flags.http_finished {
            let uploader = self.ctx.uploader.clone().filter(|u| u.is_available());
            if let Some(uploader) = uploader {
                let path = self.path.clone().ok_or(ShareError::NoLocalFile)?;
                let result = uploader
                    .upload(&path, &self.display_name(), &self.mime_type, self.progress.clone())
                    .await;
                match result {
                    Ok(url) => {
                        info!(url = %url, "published on HTTP upload service");
                        self.log.push("Published on HTTP upload service".to_string());
                        self.sources.push(url);
                    }
                    Err(e) => {
                        warn!(error = %e, "HTTP upload failed");
                        self.log
                            .push(format!("Failed to publish on HTTP upload service: {e}"));
                    }
                }
            } else {
                debug!("no HTTP upload service");
            }
            self.flags.http_finished = true;
            self.commit_publish()?;
        }

        if !self.flags.peer_stream_finished {
            self.flags.peer_stream_finished = true;
            self.commit_publish()?;
        }
        Ok(())
    }

    fn commit_publish(&mut self) -> Result<(), ShareError> {
        // TODO: require at least one successful publish path once the product decides
        if self.flags.publish_notified || !(self.flags.http_finished && self.flags.peer_stream_finished) {
            return Ok(());
        }
        let path = self.path.clone().ok_or(ShareError::NoLocalFile)?;
        let mut meta = self.metadata.clone();
        meta.insert(META_TYPE.to_string(), Value::from(self.mime_type.clone()));
        if !self.sources.is_empty() {
            meta.insert(META_URIS.to_string(), Value::from(self.sources.clone()));
        }

        if self.file_type == FileType::TempFile {
            let entry = self
                .ctx
                .cache
                .store(&self.identity, CacheContent::MoveFrom(&path), meta, TEMP_TTL)?;
            self.file_type = FileType::LocalFile;
            self.path = Some(self.ctx.config.cache_dir.join(&entry.file_name));
        } else {
            meta.insert(
                META_LINK.to_string(),
                Value::from(path.to_string_lossy().into_owned()),
            );
            self.ctx
                .cache
                .store(&self.identity, CacheContent::Bytes(&[]), meta, FILE_TTL)?;
        }
        self.flags.publish_notified = true;
        info!(sources = self.sources.len(), "publish finished");
        Ok(())
    }

    /// Starts a download of this file.
    ///
    /// A range covering exactly the whole known size is treated as a full
    /// download. Ranged downloads are never tracked. Only one full download
    /// is tracked at a time; a second one is returned untracked and the
    /// caller owns it alone. The tracked download's outcome is applied by
    /// [`download_finished`](Self::download_finished).
    pub fn download(&mut self, range: Option<ByteRange>) -> FileShareDownloader {
        let mut range = range.unwrap_or(ByteRange::WHOLE);
        if range.is_ranged()
            && self.flags.size_known
            && range.offset == 0
            && range.length == self.size
        {
            range = ByteRange::WHOLE;
        }

        let request = DownloadRequest {
            identity: self.identity.clone(),
            name: Some(self.display_name()),
            size: self.size(),
            mime_type: Some(self.mime_type.clone()).filter(|m| !m.is_empty()),
            sources: self.sources.clone(),
            peers: self.peers.clone(),
            output_dir: self.ctx.config.download_dir.clone(),
            range,
        };
        let mut downloader =
            FileShareDownloader::new(request, self.ctx.http.clone(), Arc::clone(&self.ctx.peers));
        if range.is_ranged() {
            return downloader;
        }
        if self.is_downloading() {
            warn!(name = %self.display_name(), "double download for the same file");
            return downloader;
        }

        let (notifier, outcome) = oneshot::channel();
        downloader.notify_on_finish(notifier);
        self.tracked = Some(outcome);
        downloader
    }

    /// True while a tracked download is running.
    ///
    /// An outcome that arrived since the last check is applied first.
    pub fn is_downloading(&mut self) -> bool {
        let Some(outcome) = self.tracked.as_mut() else {
            return false;
        };
        match outcome.try_recv() {
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                self.tracked = None;
                false
            }
            Ok(outcome) => {
                self.tracked = None;
                if let Err(e) = self.apply_download_outcome(&outcome) {
                    warn!(error = %e, "failed to adopt downloaded file");
                }
                false
            }
        }
    }

    /// Waits for the tracked download and adopts its result.
    ///
    /// Returns `None` when nothing is tracked. The download itself must be
    /// driven elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error if a successful download cannot be adopted by the cache.
    pub async fn download_finished(&mut self) -> Result<Option<DownloadOutcome>, ShareError> {
        let Some(outcome) = self.tracked.take() else {
            return Ok(None);
        };
        let Ok(outcome) = outcome.await else {
            return Ok(None);
        };
        self.apply_download_outcome(&outcome)?;
        Ok(Some(outcome))
    }

    /// Restores the modification time, attaches passthrough metadata and
    /// moves the downloaded file into the cache.
    fn apply_download_outcome(&mut self, outcome: &DownloadOutcome) -> Result<(), ShareError> {
        if !outcome.success {
            debug!(error = ?outcome.error, "tracked download failed");
            return Ok(());
        }
        let Some(path) = outcome.path.as_deref() else {
            return Ok(());
        };

        if let Some(modified) = self.modified {
            let file = fs::File::options()
                .write(true)
                .open(path)
                .map_err(|e| ShareError::io(path, e))?;
            file.set_modified(modified)
                .map_err(|e| ShareError::io(path, e))?;
        }

        let mut meta = Metadata::new();
        meta.insert(META_TYPE.to_string(), Value::from(self.mime_type.clone()));
        meta.insert(META_URIS.to_string(), Value::from(self.sources.clone()));
        let thumb_uri = self
            .metadata
            .get(META_THUMB_URI)
            .and_then(Value::as_str)
            .filter(|uri| !uri.is_empty());
        if let Some(thumb_uri) = thumb_uri {
            let thumb_mt = self.metadata.get(META_THUMB_MT).cloned().unwrap_or_default();
            meta.insert(META_THUMB_MT.to_string(), thumb_mt);
            meta.insert(META_THUMB_URI.to_string(), Value::from(thumb_uri));
        }
        if let Some(amplitudes) = self.metadata.get(META_AMPLITUDES).filter(|v| !is_empty_value(v)) {
            meta.insert(META_AMPLITUDES.to_string(), amplitudes.clone());
        }

        let entry = self
            .ctx
            .cache
            .store(&self.identity, CacheContent::MoveFrom(path), meta, FILE_TTL)?;
        self.init_from_entry(&entry);
        info!(path = %path.display(), "downloaded file adopted by cache");
        Ok(())
    }

    /// Advertisement of this file for peers.
    ///
    /// Sources are ordered highest priority first and always include this
    /// node's own peer-stream source. Returns `None` when the local account
    /// has no online resource.
    #[must_use]
    pub fn to_advertisement(&self) -> Option<ShareAdvertisement> {
        let local = self
            .ctx
            .peers
            .local_identity()
            .filter(|peer| peer.resource().is_some())?;

        let mut uris = self.sources.clone();
        uris.push(format!("xmpp:{local}?{PEER_STREAM_QUERY}"));
        let sources = attempt_order(uris)
            .into_iter()
            .map(crate::source::SourceUri::into_string)
            .collect();

        let on_disk = self.path.as_deref().and_then(|p| fs::metadata(p).ok());
        let amplitudes = self
            .metadata
            .get(META_AMPLITUDES)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|v| u8::try_from(v).ok())
                    .collect::<Vec<u8>>()
            })
            .filter(|a| !a.is_empty());

        let file = FileDescriptor {
            hashes: self.identity.clone(),
            name: Some(self.display_name()),
            size: on_disk.as_ref().map(fs::Metadata::len).or(self.size()),
            mime_type: Some(self.mime_type.clone()).filter(|m| !m.is_empty()),
            modified: on_disk
                .as_ref()
                .and_then(|m| m.modified().ok())
                .or(self.modified),
            description: self.description.clone(),
            amplitudes,
        };
        Some(ShareAdvertisement { file, sources })
    }
}

impl Drop for FileSharingItem {
    fn drop(&mut self) {
        if self.file_type != FileType::TempFile {
            return;
        }
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if path.exists() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed temporary share"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary share"),
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

/// Writes `data` to a new `share-*` file in `dir` that outlives this call.
fn write_temp_blob(dir: &Path, suffix: &str, data: &[u8]) -> Result<PathBuf, ShareError> {
    fs::create_dir_all(dir).map_err(|e| ShareError::io(dir, e))?;
    let mut file = tempfile::Builder::new()
        .prefix(SHARE_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| ShareError::io(dir, e))?;
    file.write_all(data)
        .map_err(|e| ShareError::io(file.path(), e))?;
    let (_, path) = file.keep().map_err(|e| ShareError::io(dir, e.error))?;
    Ok(path)
}
