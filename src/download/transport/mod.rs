//! Transport downloader strategies.
//!
//! Each strategy wraps one transport's handshake and data path behind the
//! same capability set: start, report buffered bytes, read, abort, report
//! connection state. The network side runs in a spawned worker task that
//! feeds [`Feed`] items through a bounded channel; the strategy turns them
//! into [`TransportEvent`]s one at a time when the controller asks for the
//! next event, so events for one transport are always observed in order
//! (metadata, then data, then a terminal event).
//!
//! The set of strategies is fixed, so they are dispatched through the
//! closed [`Transport`] enum rather than trait objects.

mod http;
mod peer_stream;
mod store_forward;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::constants::FEED_CHANNEL_DEPTH;
use super::range::ByteRange;

pub(crate) use http::HttpTransport;
pub(crate) use peer_stream::PeerStreamTransport;
pub(crate) use store_forward::StoreForwardTransport;

/// Events a transport raises towards the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Range and size are known; the staging file may be opened.
    MetadataReady,
    /// Bytes are buffered and can be read.
    DataAvailable,
    /// The transport finished cleanly. Buffered bytes may remain.
    Disconnected,
    /// The transport failed; see its last error.
    Failed,
}

/// Items sent by a transport worker.
#[derive(Debug)]
pub(crate) enum Feed {
    Metadata(ByteRange),
    Chunk(Bytes),
    Finished,
    Failed(String),
}

/// Caller-initiated abort handed to a worker so it can tear down its session.
#[derive(Debug, Clone)]
pub(crate) struct AbortRequest {
    pub is_failure: bool,
    pub reason: String,
}

/// Worker half of the transport channels.
pub(crate) struct WorkerLink {
    pub feed: mpsc::Sender<Feed>,
    pub abort: oneshot::Receiver<AbortRequest>,
}

/// Sends a failure; the controller may already be gone.
pub(crate) async fn send_failure(feed: &mpsc::Sender<Feed>, reason: impl Into<String>) {
    let _ = feed.send(Feed::Failed(reason.into())).await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    Connecting,
    Streaming,
    Closed,
    Aborted,
}

/// State shared by every strategy: source, range, buffer and worker channels.
#[derive(Debug)]
pub(crate) struct TransportCore {
    uri: String,
    range: ByteRange,
    last_error: Option<String>,
    buffer: BytesMut,
    feed: Option<mpsc::Receiver<Feed>>,
    abort_signal: Option<oneshot::Sender<AbortRequest>>,
    state: LinkState,
}

impl TransportCore {
    pub fn new(uri: impl Into<String>, range: ByteRange) -> Self {
        Self {
            uri: uri.into(),
            range,
            last_error: None,
            buffer: BytesMut::new(),
            feed: None,
            abort_signal: None,
            state: LinkState::Idle,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Creates the worker channels and marks the transport as connecting.
    pub fn open_link(&mut self) -> WorkerLink {
        let (feed_tx, feed_rx) = mpsc::channel(FEED_CHANNEL_DEPTH);
        let (abort_tx, abort_rx) = oneshot::channel();
        self.feed = Some(feed_rx);
        self.abort_signal = Some(abort_tx);
        self.state = LinkState::Connecting;
        WorkerLink {
            feed: feed_tx,
            abort: abort_rx,
        }
    }

    /// Queues a failure without starting a worker. It is delivered on the
    /// next event turn, never synchronously from `start`.
    pub fn fail_now(&mut self, reason: impl Into<String>) {
        let link = self.open_link();
        let _ = link.feed.try_send(Feed::Failed(reason.into()));
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let feed = self.feed.as_mut()?;
        match feed.recv().await {
            Some(Feed::Metadata(range)) => {
                self.range = range;
                self.state = LinkState::Streaming;
                Some(TransportEvent::MetadataReady)
            }
            Some(Feed::Chunk(bytes)) => {
                self.buffer.extend_from_slice(&bytes);
                Some(TransportEvent::DataAvailable)
            }
            Some(Feed::Finished) => {
                self.release(LinkState::Closed);
                Some(TransportEvent::Disconnected)
            }
            Some(Feed::Failed(reason)) => {
                debug!(uri = %self.uri, reason = %reason, "transport failed");
                if !reason.is_empty() {
                    self.last_error = Some(reason);
                }
                self.release(LinkState::Closed);
                Some(TransportEvent::Failed)
            }
            None => {
                self.last_error
                    .get_or_insert_with(|| "transport closed unexpectedly".to_string());
                self.release(LinkState::Closed);
                Some(TransportEvent::Failed)
            }
        }
    }

    pub fn bytes_available(&self) -> usize {
        self.buffer.len()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.buffer.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        n
    }

    /// Signals the worker to tear down and stops delivering events.
    ///
    /// Idempotent. Teardown itself finishes asynchronously in the worker.
    pub fn abort(&mut self, is_failure: bool, reason: &str) {
        if let Some(signal) = self.abort_signal.take() {
            let _ = signal.send(AbortRequest {
                is_failure,
                reason: reason.to_string(),
            });
        }
        if matches!(self.state, LinkState::Connecting | LinkState::Streaming) {
            self.feed = None;
            self.state = LinkState::Aborted;
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connecting | LinkState::Streaming)
    }

    pub fn is_aborted(&self) -> bool {
        self.state == LinkState::Aborted
    }

    fn release(&mut self, state: LinkState) {
        self.feed = None;
        self.abort_signal = None;
        self.state = state;
    }
}

/// One transport strategy, chosen by source kind.
#[derive(Debug)]
pub(crate) enum Transport {
    Http(HttpTransport),
    PeerStream(PeerStreamTransport),
    StoreForward(StoreForwardTransport),
}

impl Transport {
    fn core(&self) -> &TransportCore {
        match self {
            Self::Http(t) => &t.core,
            Self::PeerStream(t) => &t.core,
            Self::StoreForward(t) => &t.core,
        }
    }

    fn core_mut(&mut self) -> &mut TransportCore {
        match self {
            Self::Http(t) => &mut t.core,
            Self::PeerStream(t) => &mut t.core,
            Self::StoreForward(t) => &mut t.core,
        }
    }

    /// Begins the handshake. Results arrive through [`Transport::next_event`].
    pub fn start(&mut self) {
        match self {
            Self::Http(t) => t.start(),
            Self::PeerStream(t) => t.start(),
            Self::StoreForward(t) => t.start(),
        }
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.core_mut().next_event().await
    }

    pub fn bytes_available(&self) -> usize {
        self.core().bytes_available()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.core_mut().read(buf)
    }

    pub fn abort(&mut self, is_failure: bool, reason: &str) {
        self.core_mut().abort(is_failure, reason);
    }

    pub fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    pub fn is_aborted(&self) -> bool {
        self.core().is_aborted()
    }

    pub fn range(&self) -> ByteRange {
        self.core().range()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.core().last_error()
    }

    pub fn uri(&self) -> &str {
        self.core().uri()
    }
}
