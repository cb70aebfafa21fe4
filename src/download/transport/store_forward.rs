//! Store-and-forward strategy: fetches a small blob by content id in one response.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Feed, TransportCore, WorkerLink, send_failure};
use crate::download::range::ByteRange;
use crate::peer::{PeerId, PeerNetwork, select_online_peer};

const OFFLINE_ERROR: &str = "Store-and-forward data source is offline";

/// Length of the `cid:` scheme prefix stripped from the source.
const CID_PREFIX_LEN: usize = 4;

pub(crate) struct StoreForwardTransport {
    pub(super) core: TransportCore,
    network: Arc<dyn PeerNetwork>,
    candidates: Vec<PeerId>,
}

impl fmt::Debug for StoreForwardTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreForwardTransport")
            .field("core", &self.core)
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl StoreForwardTransport {
    /// Blobs have no partial-range support, so any requested range is dropped.
    pub fn new(network: Arc<dyn PeerNetwork>, uri: impl Into<String>, candidates: Vec<PeerId>) -> Self {
        Self {
            core: TransportCore::new(uri, ByteRange::WHOLE),
            network,
            candidates,
        }
    }

    pub fn start(&mut self) {
        let Some(peer) = select_online_peer(self.network.as_ref(), &self.candidates) else {
            self.core.fail_now(OFFLINE_ERROR);
            return;
        };
        let cid = self
            .core
            .uri()
            .get(CID_PREFIX_LEN..)
            .unwrap_or_default()
            .to_string();

        debug!(peer = %peer, cid = %cid, "requesting store-and-forward blob");
        let link = self.core.open_link();
        tokio::spawn(run_store_forward(Arc::clone(&self.network), peer, cid, link));
    }
}

async fn run_store_forward(network: Arc<dyn PeerNetwork>, peer: PeerId, cid: String, link: WorkerLink) {
    let WorkerLink { feed, mut abort } = link;

    let fetched = tokio::select! {
        biased;
        _ = &mut abort => {
            debug!(cid = %cid, "store-and-forward request aborted");
            return;
        }
        fetched = network.fetch_blob(&peer, &cid) => fetched,
    };

    match fetched {
        Ok(data) => {
            if feed.send(Feed::Metadata(ByteRange::WHOLE)).await.is_err() {
                return;
            }
            if !data.is_empty() && feed.send(Feed::Chunk(data)).await.is_err() {
                return;
            }
            let _ = feed.send(Feed::Finished).await;
        }
        Err(e) => {
            warn!(peer = %peer, cid = %cid, error = %e, "store-and-forward fetch failed");
            send_failure(&feed, format!("Download using store-and-forward failed: {e}")).await;
        }
    }
}
