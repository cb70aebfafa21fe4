//! Peer identities and the chat-protocol collaborator.
//!
//! The presence lookup, peer-stream session negotiation and store-and-forward
//! blob retrieval all belong to the chat protocol stack. This module only
//! defines the interface the download engine needs from it
//! ([`PeerNetwork`]) and the session types exchanged through it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::download::ByteRange;
use crate::identity::ContentIdentity;

/// Address of a chat peer: `node@domain/resource`.
///
/// The node and resource parts are optional; a bare domain is a valid
/// (server) address but cannot act as a file source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

/// Error parsing a [`PeerId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid peer address: {input:?}")]
pub struct PeerIdError {
    /// The rejected input.
    pub input: String,
}

impl PeerId {
    /// Builds an address from parts.
    #[must_use]
    pub fn new(node: Option<&str>, domain: &str, resource: Option<&str>) -> Self {
        Self {
            node: node.filter(|n| !n.is_empty()).map(str::to_string),
            domain: domain.to_string(),
            resource: resource.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }

    /// Node (user) part.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Domain part.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Copy of this address with another resource.
    #[must_use]
    pub fn with_resource(&self, resource: &str) -> Self {
        Self::new(self.node.as_deref(), &self.domain, Some(resource))
    }

    /// Address without the resource part.
    #[must_use]
    pub fn bare(&self) -> Self {
        Self::new(self.node.as_deref(), &self.domain, None)
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PeerIdError {
            input: s.to_string(),
        };
        let (rest, resource) = match s.split_once('/') {
            Some((rest, resource)) => (rest, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match rest.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, rest),
        };
        if domain.is_empty()
            || domain.contains(char::is_whitespace)
            || node.is_some_and(str::is_empty)
        {
            return Err(invalid());
        }
        Ok(Self::new(node, domain, resource))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{node}@")?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

/// Failures reported by the chat protocol stack.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The selected peer is not online.
    #[error("peer {peer} is offline")]
    Offline {
        /// Peer that was addressed.
        peer: PeerId,
    },

    /// Peer-stream file transfer is not enabled on this account.
    #[error("peer-stream file transfer is disabled")]
    TransferDisabled,

    /// The remote side refused the session.
    #[error("peer {peer} rejected the session: {reason}")]
    Rejected {
        /// Peer that refused.
        peer: PeerId,
        /// Reason text from the peer.
        reason: String,
    },

    /// A store-and-forward blob could not be fetched.
    #[error("failed to fetch blob {cid} from {peer}: {reason}")]
    BlobUnavailable {
        /// Peer asked for the blob.
        peer: PeerId,
        /// Content id requested.
        cid: String,
        /// Reason text.
        reason: String,
    },
}

/// File description sent to a peer when negotiating a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    /// Hashes of the requested content.
    pub identity: ContentIdentity,
    /// File name as advertised.
    pub name: Option<String>,
    /// Total size, if known.
    pub size: Option<u64>,
    /// Media type.
    pub mime_type: Option<String>,
    /// Requested byte range; `None` for the whole file.
    pub range: Option<ByteRange>,
}

/// Why a peer-stream session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Transfer finished normally.
    Success,
    /// Session declined by either side.
    Decline(String),
    /// The file-transfer application failed.
    FailedApplication(String),
    /// Transport-level failure or any other reason.
    Other(String),
}

impl TerminationReason {
    /// True only for [`TerminationReason::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Events raised by a negotiated peer-stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer accepted and the byte connection is ready. Carries the range
    /// the peer agreed to send.
    ConnectionReady {
        /// Accepted range (0/0 = whole file).
        range: ByteRange,
    },
    /// Bytes received on the connection.
    Data(Bytes),
    /// The peer tried to add new content to this session.
    NewContentReceived,
    /// The session ended.
    Terminated(TerminationReason),
}

/// Live peer-stream session handed back by [`PeerNetwork::open_stream`].
#[derive(Debug)]
pub struct PeerSession {
    /// Incoming session events, in order.
    pub events: mpsc::Receiver<SessionEvent>,
    /// Terminates the session with the given reason. Teardown is
    /// asynchronous; further events may still arrive.
    pub terminate: mpsc::UnboundedSender<TerminationReason>,
}

/// Interface to the chat protocol stack.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Full address of the local account, if it is online.
    fn local_identity(&self) -> Option<PeerId>;

    /// True when `peer` is a known, online resource.
    fn is_online(&self, peer: &PeerId) -> bool;

    /// Negotiates a peer-stream session for `offer` with `peer`.
    async fn open_stream(&self, peer: &PeerId, offer: FileOffer)
    -> Result<PeerSession, PeerError>;

    /// Fetches a store-and-forward blob by content id.
    async fn fetch_blob(&self, peer: &PeerId, cid: &str) -> Result<Bytes, PeerError>;
}

/// Picks the first online candidate that is not the local account.
#[must_use]
pub fn select_online_peer(network: &dyn PeerNetwork, candidates: &[PeerId]) -> Option<PeerId> {
    let local = network.local_identity();
    candidates
        .iter()
        .filter(|peer| local.as_ref() != Some(*peer))
        .find(|peer| network.is_online(peer))
        .cloned()
}

/// Peer network with nobody online; used when no chat session exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePeers;

#[async_trait]
impl PeerNetwork for OfflinePeers {
    fn local_identity(&self) -> Option<PeerId> {
        None
    }

    fn is_online(&self, _peer: &PeerId) -> bool {
        false
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        _offer: FileOffer,
    ) -> Result<PeerSession, PeerError> {
        Err(PeerError::Offline { peer: peer.clone() })
    }

    async fn fetch_blob(&self, peer: &PeerId, _cid: &str) -> Result<Bytes, PeerError> {
        Err(PeerError::Offline { peer: peer.clone() })
    }
}
