//! HTTP/FTP strategy: one GET request, optionally ranged, streamed chunk by chunk.

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_RANGE, RANGE};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use super::{Feed, TransportCore, WorkerLink, send_failure};
use crate::download::range::{ByteRange, parse_content_range};

#[derive(Debug)]
pub(crate) struct HttpTransport {
    pub(super) core: TransportCore,
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client, uri: impl Into<String>, range: ByteRange) -> Self {
        Self {
            core: TransportCore::new(uri, range),
            client,
        }
    }

    pub fn start(&mut self) {
        let link = self.core.open_link();
        let client = self.client.clone();
        let uri = self.core.uri().to_string();
        let range = self.core.range();
        tokio::spawn(run_http(client, uri, range, link));
    }
}

async fn run_http(client: Client, uri: String, range: ByteRange, link: WorkerLink) {
    let WorkerLink { feed, mut abort } = link;
    tokio::select! {
        biased;
        _ = &mut abort => {
            debug!(uri = %uri, "http transfer aborted");
        }
        () = stream_http(&client, &uri, range, &feed) => {}
    }
}

#[instrument(level = "debug", skip(client, feed))]
async fn stream_http(client: &Client, uri: &str, range: ByteRange, feed: &mpsc::Sender<Feed>) {
    let mut request = client.get(uri);
    if let Some(value) = range.to_header_value() {
        request = request.header(RANGE, value);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            send_failure(feed, e.to_string()).await;
            return;
        }
    };

    let status = response.status().as_u16();
    let content_range = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let reported = match reported_range(status, content_range.as_deref()) {
        Ok(reported) => reported,
        Err(reason) => {
            send_failure(feed, reason).await;
            return;
        }
    };
    debug!(status, reported = %reported, "http response metadata");
    if feed.send(Feed::Metadata(reported)).await.is_err() {
        return;
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => {
                if feed.send(Feed::Chunk(bytes)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                send_failure(feed, e.to_string()).await;
                return;
            }
        }
    }
    let _ = feed.send(Feed::Finished).await;
}

/// Range actually delivered by a response, or the failure text for its status.
///
/// 206 takes the range from `Content-Range` (a present but unparseable header
/// fails the transport); 200 and 203 deliver the whole file.
pub(crate) fn reported_range(status: u16, content_range: Option<&str>) -> Result<ByteRange, String> {
    match status {
        206 => match content_range.filter(|v| !v.is_empty()) {
            Some(value) => {
                parse_content_range(value).ok_or_else(|| "Invalid HTTP response range".to_string())
            }
            None => Ok(ByteRange::WHOLE),
        },
        200 | 203 => Ok(ByteRange::WHOLE),
        other => Err(format!("Unexpected HTTP status: {other}")),
    }
}
