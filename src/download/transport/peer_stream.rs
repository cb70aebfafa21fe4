//! Peer-stream strategy: negotiates a direct session with an online peer.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use super::{AbortRequest, Feed, TransportCore, WorkerLink, send_failure};
use crate::download::range::ByteRange;
use crate::peer::{
    FileOffer, PeerId, PeerNetwork, PeerSession, SessionEvent, TerminationReason,
    select_online_peer,
};
use crate::source::PEER_STREAM_QUERY;

const OFFLINE_ERROR: &str = "Peer-stream data source is offline";
const INVALID_URI_ERROR: &str = "Invalid peer-stream URI";
const UNEXPECTED_CONTENT_ERROR: &str = "Unexpected incoming content";
const SESSION_FAILED_ERROR: &str = "Peer-stream download failed";

pub(crate) struct PeerStreamTransport {
    pub(super) core: TransportCore,
    network: Arc<dyn PeerNetwork>,
    offer: FileOffer,
    candidates: Vec<PeerId>,
}

impl fmt::Debug for PeerStreamTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerStreamTransport")
            .field("core", &self.core)
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl PeerStreamTransport {
    pub fn new(
        network: Arc<dyn PeerNetwork>,
        uri: impl Into<String>,
        offer: FileOffer,
        candidates: Vec<PeerId>,
        range: ByteRange,
    ) -> Self {
        Self {
            core: TransportCore::new(uri, range),
            network,
            offer,
            candidates,
        }
    }

    pub fn start(&mut self) {
        let target = PeerStreamTarget::parse(self.core.uri());

        let mut candidates = self.candidates.clone();
        if let Some(addressed) = target.peer.filter(|p| p.node().is_some()) {
            candidates.insert(0, addressed);
        }
        let Some(peer) = select_online_peer(self.network.as_ref(), &candidates) else {
            self.core.fail_now(OFFLINE_ERROR);
            return;
        };

        if target.query_type.as_deref() != Some(PEER_STREAM_QUERY) {
            self.core.fail_now(INVALID_URI_ERROR);
            return;
        }

        let mut offer = self.offer.clone();
        let range = self.core.range();
        offer.range = range.is_ranged().then_some(range);

        debug!(peer = %peer, range = %range, "opening peer-stream session");
        let link = self.core.open_link();
        tokio::spawn(run_peer_stream(Arc::clone(&self.network), peer, offer, link));
    }
}

/// Peer and query marker addressed by a peer-stream URI.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PeerStreamTarget {
    pub peer: Option<PeerId>,
    pub query_type: Option<String>,
}

impl PeerStreamTarget {
    /// Parses `xmpp:node@domain/resource?jingle-ft;...`.
    ///
    /// The authority form (`xmpp://self@host/peer@domain`) yields a path with
    /// a leading slash, which is dropped. The query is split on `;` and only
    /// the key of its first item is kept.
    pub fn parse(uri: &str) -> Self {
        let Ok(url) = Url::parse(uri) else {
            return Self::default();
        };
        let path = url.path();
        let path = path.strip_prefix('/').unwrap_or(path);
        let peer = path.parse::<PeerId>().ok();
        let query_type = url.query().map(|query| {
            let first = query.split(';').next().unwrap_or_default();
            first.split('=').next().unwrap_or_default().to_string()
        });
        Self { peer, query_type }
    }
}

async fn run_peer_stream(
    network: Arc<dyn PeerNetwork>,
    peer: PeerId,
    offer: FileOffer,
    link: WorkerLink,
) {
    let WorkerLink { feed, mut abort } = link;

    let session = tokio::select! {
        biased;
        _ = &mut abort => {
            debug!(peer = %peer, "peer-stream aborted during negotiation");
            return;
        }
        opened = network.open_stream(&peer, offer) => match opened {
            Ok(session) => session,
            Err(e) => {
                warn!(peer = %peer, error = %e, "peer-stream session not opened");
                send_failure(&feed, e.to_string()).await;
                return;
            }
        },
    };

    drive_session(session, &feed, abort).await;
}

async fn drive_session(
    mut session: PeerSession,
    feed: &mpsc::Sender<Feed>,
    mut abort: tokio::sync::oneshot::Receiver<AbortRequest>,
) {
    let mut last_error = SESSION_FAILED_ERROR;
    loop {
        tokio::select! {
            biased;
            request = &mut abort => {
                let reason = match request {
                    Ok(AbortRequest { is_failure: true, reason }) => {
                        TerminationReason::FailedApplication(reason)
                    }
                    Ok(AbortRequest { reason, .. }) => TerminationReason::Decline(reason),
                    Err(_) => TerminationReason::Decline(String::new()),
                };
                let _ = session.terminate.send(reason);
                return;
            }
            event = session.events.recv() => {
                let delivered = match event {
                    Some(SessionEvent::ConnectionReady { range }) => {
                        feed.send(Feed::Metadata(range)).await.is_ok()
                    }
                    Some(SessionEvent::Data(bytes)) if bytes.is_empty() => true,
                    Some(SessionEvent::Data(bytes)) => feed.send(Feed::Chunk(bytes)).await.is_ok(),
                    Some(SessionEvent::NewContentReceived) => {
                        // a download session never expects content from the other side
                        last_error = UNEXPECTED_CONTENT_ERROR;
                        let _ = session.terminate.send(TerminationReason::Decline(
                            UNEXPECTED_CONTENT_ERROR.to_string(),
                        ));
                        true
                    }
                    Some(SessionEvent::Terminated(reason)) => {
                        if reason.is_success() {
                            let _ = feed.send(Feed::Finished).await;
                        } else {
                            debug!(?reason, "peer-stream session terminated");
                            send_failure(feed, last_error).await;
                        }
                        return;
                    }
                    None => {
                        send_failure(feed, last_error).await;
                        return;
                    }
                };
                if !delivered {
                    let _ = session.terminate.send(TerminationReason::Decline(String::new()));
                    return;
                }
            }
        }
    }
}
