//! Sequential-fallback download controller.
//!
//! [`FileShareDownloader`] owns the priority-ordered source queue of one
//! download session and drives at most one transport at a time. A transport
//! that fails before reporting metadata is discarded and the next source is
//! started; once metadata has been reported, bytes are committed to the
//! staging file and any transport failure ends the session.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fileshare_core::download::{DownloadRequest, FileShareDownloader, HttpClient};
//! use fileshare_core::peer::OfflinePeers;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = DownloadRequest::new(vec!["https://example.com/photo.png".to_string()], "./downloads")
//!     .with_name("photo.png");
//! let downloader = FileShareDownloader::new(request, HttpClient::new(), Arc::new(OfflinePeers));
//! let path = downloader.read_to_end().await?;
//! println!("Downloaded: {}", path.display());
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use super::HttpClient;
use super::constants::{NO_SOURCES_ERROR, STAGING_PREFIX, UNHANDLED_SOURCE_ERROR};
use super::error::DownloadError;
use super::filename::{clean_file_name, reserve_unique_path};
use super::range::ByteRange;
use super::transport::{
    HttpTransport, PeerStreamTransport, StoreForwardTransport, Transport, TransportEvent,
};
use crate::identity::ContentIdentity;
use crate::peer::{FileOffer, PeerId, PeerNetwork};
use crate::source::{SourceKind, SourceUri, sort_sources_by_priority};

/// Size of the buffer used by [`FileShareDownloader::read_to_end`].
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Base name used when the file has neither a name nor a hash.
const FALLBACK_BASE_NAME: &str = "download";

/// Everything a download session needs to know about the wanted file.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Hashes of the file, sent to peers and used as a fallback name.
    pub identity: ContentIdentity,
    /// Advertised file name.
    pub name: Option<String>,
    /// Advertised size.
    pub size: Option<u64>,
    /// Advertised media type.
    pub mime_type: Option<String>,
    /// Source URIs in any order; unknown kinds are dropped.
    pub sources: Vec<String>,
    /// Peers that may serve peer-stream and store-and-forward sources.
    pub peers: Vec<PeerId>,
    /// Directory receiving the destination and staging files.
    pub output_dir: PathBuf,
    /// Requested range; whole file by default.
    pub range: ByteRange,
}

impl DownloadRequest {
    /// Creates a whole-file request with no descriptor metadata.
    pub fn new(sources: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            identity: ContentIdentity::default(),
            name: None,
            size: None,
            mime_type: None,
            sources,
            peers: Vec::new(),
            output_dir: output_dir.into(),
            range: ByteRange::WHOLE,
        }
    }

    /// Sets the advertised file name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the content identity.
    #[must_use]
    pub fn with_identity(mut self, identity: ContentIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the peer candidates.
    #[must_use]
    pub fn with_peers(mut self, peers: Vec<PeerId>) -> Self {
        self.peers = peers;
        self
    }

    /// Sets the requested range.
    #[must_use]
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = range;
        self
    }
}

/// Events a download session raises towards its caller, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    /// A transport reported metadata; [`FileShareDownloader::range`] is now authoritative.
    MetadataChanged,
    /// Bytes can be read.
    ReadyRead,
    /// The active transport finished; buffered bytes may remain.
    Disconnected,
    /// The session ended. Delivered exactly once; no event follows it.
    Finished,
}

/// Result of a finished session, sent to the completion notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// True when the destination file is complete.
    pub success: bool,
    /// Destination file, set on success.
    pub path: Option<PathBuf>,
    /// Range that was delivered.
    pub range: ByteRange,
    /// Last recorded error text, set on failure.
    pub error: Option<String>,
}

#[derive(Debug)]
struct Staging {
    path: PathBuf,
    file: Option<File>,
}

/// Downloads one file from a list of sources, one transport at a time.
///
/// The session is pull-driven: [`next_event`](Self::next_event) advances the
/// active transport and [`read`](Self::read) moves buffered bytes into the
/// staging file and out to the caller.
pub struct FileShareDownloader {
    http: HttpClient,
    network: Arc<dyn PeerNetwork>,
    offer: FileOffer,
    candidates: Vec<PeerId>,
    /// Lowest priority first; the next source is popped from the tail.
    sources: Vec<SourceUri>,
    output_dir: PathBuf,
    range: ByteRange,
    destination: Option<PathBuf>,
    staging: Option<Staging>,
    active: Option<Transport>,
    pending: VecDeque<DownloadEvent>,
    notifier: Option<oneshot::Sender<DownloadOutcome>>,
    last_error: Option<String>,
    error: Option<DownloadError>,
    bytes_written: u64,
    opened: bool,
    metadata_ready: bool,
    success: bool,
    finished: bool,
}

impl std::fmt::Debug for FileShareDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileShareDownloader")
            .field("sources", &self.sources)
            .field("range", &self.range)
            .field("destination", &self.destination)
            .field("active", &self.active)
            .field("metadata_ready", &self.metadata_ready)
            .field("success", &self.success)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl FileShareDownloader {
    /// Creates a session. Nothing happens until [`open`](Self::open).
    #[must_use]
    pub fn new(request: DownloadRequest, http: HttpClient, network: Arc<dyn PeerNetwork>) -> Self {
        let DownloadRequest {
            identity,
            name,
            size,
            mime_type,
            sources,
            peers,
            output_dir,
            range,
        } = request;
        Self {
            http,
            network,
            offer: FileOffer {
                identity,
                name,
                size,
                mime_type,
                range: None,
            },
            candidates: peers,
            sources: sort_sources_by_priority(sources),
            output_dir,
            range,
            destination: None,
            staging: None,
            active: None,
            pending: VecDeque::new(),
            notifier: None,
            last_error: None,
            error: None,
            bytes_written: 0,
            opened: false,
            metadata_ready: false,
            success: false,
            finished: false,
        }
    }

    /// Registers a one-shot receiver for the session outcome.
    pub fn notify_on_finish(&mut self, notifier: oneshot::Sender<DownloadOutcome>) {
        self.notifier = Some(notifier);
    }

    /// Allocates the destination name and starts the first transport.
    ///
    /// The destination's `dl-` staging file is created empty here, so two
    /// sessions for the same name in one directory get distinct
    /// destinations. Returns `false` without starting anything when there
    /// are no usable sources or the output directory or staging file cannot
    /// be created. Opening an already opened session is a no-op returning
    /// `true`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since transports run as
    /// spawned tasks.
    pub fn open(&mut self) -> bool {
        if self.opened {
            return true;
        }
        if self.finished {
            return false;
        }
        if self.sources.is_empty() {
            self.last_error = Some(NO_SOURCES_ERROR.to_string());
            self.finish(Some(DownloadError::source_exhausted(NO_SOURCES_ERROR)));
            return false;
        }
        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            let error = DownloadError::local_storage(&self.output_dir, e);
            self.finish(Some(error));
            return false;
        }

        if self.range.offset == 0
            && self.range.length > 0
            && self.offer.size == Some(self.range.length)
        {
            debug!("range covers the whole file, requesting it unranged");
            self.range = ByteRange::WHOLE;
        }

        let name = self
            .offer
            .name
            .as_deref()
            .map(clean_file_name)
            .filter(|n| !n.is_empty())
            .or_else(|| Some(self.offer.identity.primary_hex()).filter(|h| !h.is_empty()))
            .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());
        let (destination, staging) =
            match reserve_unique_path(&self.output_dir, &name, STAGING_PREFIX) {
                Ok(reserved) => reserved,
                Err(e) => {
                    let error = DownloadError::local_storage(self.output_dir.join(&name), e);
                    self.finish(Some(error));
                    return false;
                }
            };
        debug!(destination = %destination.display(), sources = self.sources.len(), "opening download");
        self.destination = Some(destination);
        self.staging = Some(Staging {
            path: staging,
            file: None,
        });
        self.opened = true;
        self.start_next_transport();
        true
    }

    /// Waits for the next session event. Returns `None` once
    /// [`DownloadEvent::Finished`] has been delivered, or before `open`.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            let active = self.active.as_mut()?;
            let event = active.next_event().await;
            let buffered = active.bytes_available();
            match event {
                Some(TransportEvent::MetadataReady) => self.on_metadata_ready(),
                Some(TransportEvent::DataAvailable) => self.pending.push_back(DownloadEvent::ReadyRead),
                Some(TransportEvent::Disconnected) => {
                    self.pending.push_back(DownloadEvent::Disconnected);
                    self.complete_if_drained();
                }
                Some(TransportEvent::Failed) => self.on_transport_failed(),
                None if buffered > 0 => self.pending.push_back(DownloadEvent::ReadyRead),
                None => self.complete_if_drained(),
            }
        }
    }

    /// Moves buffered bytes into `buf`, writing them to the staging file first.
    ///
    /// A failed staging write aborts the transport, ends the session and
    /// returns 0; the bytes taken from the transport are dropped. When the
    /// transport is drained and disconnected the session completes.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };
        let n = active.read(buf);
        if n > 0 {
            let written = match self.staging.as_mut() {
                Some(Staging {
                    path,
                    file: Some(file),
                }) => file
                    .write_all(&buf[..n])
                    .map_err(|e| DownloadError::local_storage(path.clone(), e)),
                _ => Err(DownloadError::local_storage(
                    self.output_dir.clone(),
                    std::io::Error::other("staging file is not open"),
                )),
            };
            if let Err(error) = written {
                active.abort(true, "local storage failed");
                self.finish(Some(error));
                return 0;
            }
            self.bytes_written += n as u64;
        }
        self.complete_if_drained();
        n
    }

    /// Aborts the session. Idempotent; a no-op once finished.
    pub fn abort(&mut self) {
        if self.finished {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.abort(false, "download cancelled");
        }
        self.finish(Some(DownloadError::Aborted));
    }

    /// Drives the session to completion and returns the destination path.
    ///
    /// # Errors
    ///
    /// Returns the terminal error of the session.
    #[instrument(level = "debug", skip(self))]
    pub async fn read_to_end(mut self) -> Result<PathBuf, DownloadError> {
        self.open();
        let mut buf = vec![0_u8; READ_CHUNK_SIZE];
        while let Some(event) = self.next_event().await {
            match event {
                DownloadEvent::ReadyRead | DownloadEvent::Disconnected => {
                    while self.read(&mut buf) > 0 {}
                }
                DownloadEvent::MetadataChanged | DownloadEvent::Finished => {}
            }
        }
        match (self.success, self.destination.take()) {
            (true, Some(path)) => Ok(path),
            _ => Err(self.error.take().unwrap_or_else(|| {
                DownloadError::source_exhausted(
                    self.last_error.clone().unwrap_or_else(|| NO_SOURCES_ERROR.to_string()),
                )
            })),
        }
    }

    /// True once the destination file is complete.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// True once [`DownloadEvent::Finished`] has been queued.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True while a transport is negotiating or streaming.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active.as_ref().is_some_and(Transport::is_connected)
    }

    /// Bytes buffered in the active transport.
    #[must_use]
    pub fn bytes_available(&self) -> usize {
        self.active.as_ref().map_or(0, Transport::bytes_available)
    }

    /// Bytes written to the staging file so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Sets the requested range. Only effective before [`open`](Self::open).
    pub fn set_range(&mut self, offset: u64, length: u64) {
        if self.opened {
            warn!("range change ignored on an opened download");
            return;
        }
        self.range = ByteRange::new(offset, length);
    }

    /// Requested range, or the range reported by the transport once metadata is known.
    #[must_use]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// True unless the whole file is requested.
    #[must_use]
    pub fn is_ranged(&self) -> bool {
        self.range.is_ranged()
    }

    /// Destination path, only after a successful download.
    #[must_use]
    pub fn file_name(&self) -> Option<&Path> {
        self.destination.as_deref().filter(|_| self.success)
    }

    /// Staging file path, reserved by [`open`](Self::open).
    #[must_use]
    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(|s| s.path.as_path())
    }

    /// Last recorded error text.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Terminal error of a failed or aborted session.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadError> {
        self.error.as_ref()
    }

    /// Source URIs not attempted yet, next attempt first.
    #[must_use]
    pub fn remaining_sources(&self) -> Vec<&str> {
        self.sources.iter().rev().map(SourceUri::as_str).collect()
    }

    fn start_next_transport(&mut self) {
        while let Some(source) = self.sources.pop() {
            let mut transport = match source.kind() {
                SourceKind::Http | SourceKind::Ftp => Transport::Http(HttpTransport::new(
                    self.http.inner().clone(),
                    source.as_str(),
                    self.range,
                )),
                SourceKind::PeerStream => Transport::PeerStream(PeerStreamTransport::new(
                    Arc::clone(&self.network),
                    source.as_str(),
                    self.offer.clone(),
                    self.candidates.clone(),
                    self.range,
                )),
                SourceKind::StoreForward => Transport::StoreForward(StoreForwardTransport::new(
                    Arc::clone(&self.network),
                    source.as_str(),
                    self.candidates.clone(),
                )),
                SourceKind::Unknown => {
                    let error = DownloadError::unsupported_source(source.as_str());
                    warn!(error = %error, "no transport for source");
                    self.last_error = Some(UNHANDLED_SOURCE_ERROR.to_string());
                    continue;
                }
            };
            debug!(uri = source.as_str(), kind = %source.kind(), "starting transport");
            transport.start();
            self.active = Some(transport);
            return;
        }

        let reason = self
            .last_error
            .clone()
            .unwrap_or_else(|| NO_SOURCES_ERROR.to_string());
        self.finish(Some(DownloadError::source_exhausted(reason)));
    }

    fn on_metadata_ready(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(staging) = self.staging.as_mut().filter(|s| s.file.is_none()) {
            let opened = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&staging.path);
            match opened {
                Ok(file) => staging.file = Some(file),
                Err(e) => {
                    let error = DownloadError::local_storage(staging.path.clone(), e);
                    active.abort(true, "staging file unavailable");
                    self.finish(Some(error));
                    return;
                }
            }
        }
        self.metadata_ready = true;
        self.range = active.range();
        debug!(uri = active.uri(), range = %self.range, "transport metadata ready");
        self.pending.push_back(DownloadEvent::MetadataChanged);
    }

    fn on_transport_failed(&mut self) {
        let Some(failed) = self.active.take() else {
            return;
        };
        let reason = failed.last_error().unwrap_or("transport failed").to_string();
        self.last_error = Some(reason.clone());
        if self.metadata_ready {
            self.finish(Some(DownloadError::stream_failed(failed.uri(), reason)));
        } else {
            let error = DownloadError::handshake_failed(failed.uri(), reason);
            warn!(error = %error, recoverable = error.is_recoverable(), "source failed before metadata, trying next");
            self.start_next_transport();
        }
    }

    fn complete_if_drained(&mut self) {
        if self.finished {
            return;
        }
        let drained = self
            .active
            .as_ref()
            .is_some_and(|t| !t.is_connected() && t.bytes_available() == 0);
        if drained {
            let outcome = self.promote();
            self.finish(outcome.err());
        }
    }

    /// Flushes the staging file and renames it onto the destination.
    fn promote(&mut self) -> Result<(), DownloadError> {
        let staging = self.staging.as_mut().ok_or_else(|| {
            DownloadError::local_storage(
                self.output_dir.clone(),
                std::io::Error::other("staging file is not open"),
            )
        })?;
        if let Some(mut file) = staging.file.take() {
            file.flush()
                .map_err(|e| DownloadError::local_storage(staging.path.clone(), e))?;
        }
        let destination = self
            .destination
            .clone()
            .unwrap_or_else(|| self.output_dir.join(FALLBACK_BASE_NAME));
        std::fs::rename(&staging.path, &destination)
            .map_err(|e| DownloadError::local_storage(destination.clone(), e))?;
        self.success = true;
        info!(
            bytes = self.bytes_written,
            path = %destination.display(),
            "download finished"
        );
        Ok(())
    }

    fn finish(&mut self, error: Option<DownloadError>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.active = None;
        if let Some(staging) = self.staging.as_mut() {
            staging.file = None;
            if !self.metadata_ready && !self.success {
                // nothing was committed, release the reservation
                if let Err(e) = std::fs::remove_file(&staging.path) {
                    debug!(path = %staging.path.display(), error = %e, "staging reservation not removed");
                }
            }
        }
        if let Some(error) = error {
            if !matches!(error, DownloadError::Aborted) || self.last_error.is_none() {
                self.last_error = Some(match &error {
                    DownloadError::SourceExhausted { last_error } => last_error.clone(),
                    DownloadError::TransportStreamFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                });
            }
            warn!(error = %error, "download failed");
            self.error = Some(error);
        }
        if let Some(notifier) = self.notifier.take() {
            let _ = notifier.send(DownloadOutcome {
                success: self.success,
                path: self.file_name().map(Path::to_path_buf),
                range: self.range,
                error: if self.success {
                    None
                } else {
                    self.last_error.clone()
                },
            });
        }
        self.pending.push_back(DownloadEvent::Finished);
    }
}

impl Drop for FileShareDownloader {
    fn drop(&mut self) {
        if self.opened && !self.finished {
            debug!("dropping unfinished download");
            self.abort();
        }
    }
}
