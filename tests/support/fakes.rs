//! Scripted collaborators for integration tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use fileshare_core::peer::{
    FileOffer, PeerError, PeerId, PeerNetwork, PeerSession, SessionEvent, TerminationReason,
};
use fileshare_core::sharing::{HttpUploader, UploadError};
use fileshare_core::{DiskCache, ShareConfig, SharingContext};
use tokio::sync::mpsc;

pub fn peer(address: &str) -> PeerId {
    address.parse().unwrap()
}

/// What the next `open_stream` call does.
enum SessionScript {
    Reject(String),
    Events(Vec<SessionEvent>),
}

/// Peer network with a fixed presence list and scripted sessions and blobs.
///
/// Session senders are kept alive, so a script without a `Terminated` event
/// stalls until the session is aborted.
#[derive(Default)]
pub struct FakePeerNetwork {
    local: Option<PeerId>,
    online: Vec<PeerId>,
    sessions: Mutex<VecDeque<SessionScript>>,
    blobs: HashMap<String, Bytes>,
    offers: Mutex<Vec<(PeerId, FileOffer)>>,
    blob_requests: Mutex<Vec<(PeerId, String)>>,
    terminations: Arc<Mutex<Vec<TerminationReason>>>,
    held: Mutex<Vec<mpsc::Sender<SessionEvent>>>,
}

impl FakePeerNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, address: &str) -> Self {
        self.local = Some(peer(address));
        self
    }

    pub fn with_online(mut self, address: &str) -> Self {
        self.online.push(peer(address));
        self
    }

    pub fn with_session(self, events: Vec<SessionEvent>) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .push_back(SessionScript::Events(events));
        self
    }

    pub fn with_rejected_session(self, reason: &str) -> Self {
        self.sessions
            .lock()
            .unwrap()
            .push_back(SessionScript::Reject(reason.to_string()));
        self
    }

    pub fn with_blob(mut self, cid: &str, data: &[u8]) -> Self {
        self.blobs
            .insert(cid.to_string(), Bytes::copy_from_slice(data));
        self
    }

    pub fn offers(&self) -> Vec<(PeerId, FileOffer)> {
        self.offers.lock().unwrap().clone()
    }

    pub fn blob_requests(&self) -> Vec<(PeerId, String)> {
        self.blob_requests.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> Vec<TerminationReason> {
        self.terminations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerNetwork for FakePeerNetwork {
    fn local_identity(&self) -> Option<PeerId> {
        self.local.clone()
    }

    fn is_online(&self, peer: &PeerId) -> bool {
        self.online.contains(peer)
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        offer: FileOffer,
    ) -> Result<PeerSession, PeerError> {
        self.offers.lock().unwrap().push((peer.clone(), offer));
        let script = self.sessions.lock().unwrap().pop_front();
        let events = match script {
            Some(SessionScript::Events(events)) => events,
            Some(SessionScript::Reject(reason)) => {
                return Err(PeerError::Rejected {
                    peer: peer.clone(),
                    reason,
                });
            }
            None => {
                return Err(PeerError::Rejected {
                    peer: peer.clone(),
                    reason: "no session scripted".to_string(),
                });
            }
        };

        let (event_tx, event_rx) = mpsc::channel(events.len() + 1);
        for event in events {
            event_tx.try_send(event).unwrap();
        }
        self.held.lock().unwrap().push(event_tx);

        let (terminate_tx, mut terminate_rx) = mpsc::unbounded_channel();
        let terminations = Arc::clone(&self.terminations);
        tokio::spawn(async move {
            while let Some(reason) = terminate_rx.recv().await {
                terminations.lock().unwrap().push(reason);
            }
        });

        Ok(PeerSession {
            events: event_rx,
            terminate: terminate_tx,
        })
    }

    async fn fetch_blob(&self, peer: &PeerId, cid: &str) -> Result<Bytes, PeerError> {
        self.blob_requests
            .lock()
            .unwrap()
            .push((peer.clone(), cid.to_string()));
        self.blobs
            .get(cid)
            .cloned()
            .ok_or_else(|| PeerError::BlobUnavailable {
                peer: peer.clone(),
                cid: cid.to_string(),
                reason: "item-not-found".to_string(),
            })
    }
}

/// Upload service returning a fixed result.
pub struct FakeUploader {
    available: bool,
    result: Result<String, UploadError>,
    calls: AtomicUsize,
}

impl FakeUploader {
    pub fn succeeding(url: &str) -> Self {
        Self {
            available: true,
            result: Ok(url.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: &str) -> Self {
        Self {
            available: true,
            result: Err(UploadError::Failed {
                status: status.to_string(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            result: Err(UploadError::Unavailable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpUploader for FakeUploader {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn upload(
        &self,
        path: &Path,
        _name: &str,
        _mime_type: &str,
        progress: Option<mpsc::UnboundedSender<u64>>,
    ) -> Result<String, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(progress) = progress {
            let size = std::fs::metadata(path).map_or(0, |m| m.len());
            let _ = progress.send(size);
        }
        self.result.clone()
    }
}

/// Sharing context with every directory under `root` and a disk cache.
pub fn sharing_context(root: &Path, network: Arc<dyn PeerNetwork>) -> SharingContext {
    let config = ShareConfig {
        download_dir: root.join("downloads"),
        cache_dir: root.join("cache"),
        temp_dir: root.join("tmp"),
        ..ShareConfig::default()
    };
    let cache = Arc::new(DiskCache::new(config.cache_dir.clone()));
    SharingContext::new(config, cache, network).unwrap()
}
