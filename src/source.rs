//! Source URI classification and priority ordering.
//!
//! A shared file is advertised with several source URIs, one per transport.
//! [`SourceKind::classify`] maps a URI to its transport by scheme prefix and
//! [`sort_sources_by_priority`] orders a list so that the download
//! controller can pop the best remaining source from the tail.

use std::fmt;

use url::Url;

/// Query marker a peer-stream source URI must carry.
pub const PEER_STREAM_QUERY: &str = "jingle-ft";

/// Transport a source URI is served over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `http://` or `https://` URL.
    Http,
    /// `ftp://` URL.
    Ftp,
    /// Peer-to-peer streaming session (`xmpp:` URI with a `jingle-ft` query).
    PeerStream,
    /// Store-and-forward blob addressed by content id (`cid:`).
    StoreForward,
    /// Anything else; never attempted.
    Unknown,
}

impl SourceKind {
    /// Classifies a URI by scheme prefix.
    ///
    /// Prefixes are checked in a fixed order: `http`, `xmpp`, `ftp`, `cid`.
    #[must_use]
    pub fn classify(uri: &str) -> Self {
        if uri.starts_with("http") {
            Self::Http
        } else if uri.starts_with("xmpp") {
            Self::PeerStream
        } else if uri.starts_with("ftp") {
            Self::Ftp
        } else if uri.starts_with("cid") {
            Self::StoreForward
        } else {
            Self::Unknown
        }
    }

    /// Priority rank; higher ranks are tried first. `None` for [`SourceKind::Unknown`].
    #[must_use]
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Http => Some(0),
            Self::Ftp => Some(1),
            Self::StoreForward => Some(2),
            Self::PeerStream => Some(3),
            Self::Unknown => None,
        }
    }

    /// True for the kinds served by the HTTP client.
    #[must_use]
    pub fn is_network_url(self) -> bool {
        matches!(self, Self::Http | Self::Ftp)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Http => "http",
            Self::Ftp => "ftp",
            Self::PeerStream => "peer-stream",
            Self::StoreForward => "store-forward",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// A source URI tagged with its transport kind at classification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUri {
    uri: String,
    kind: SourceKind,
}

impl SourceUri {
    /// Classifies and wraps `uri`.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let kind = SourceKind::classify(&uri);
        Self { uri, kind }
    }

    /// The raw URI string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Unwraps the raw URI string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.uri
    }

    /// Transport kind.
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Orders sources from lowest to highest priority, dropping unknown kinds.
///
/// Sources of equal kind keep their input order. Consumers pop from the
/// tail, so the last element is the first one attempted.
#[must_use]
pub fn sort_sources_by_priority<I, S>(uris: I) -> Vec<SourceUri>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sources: Vec<SourceUri> = uris
        .into_iter()
        .map(SourceUri::new)
        .filter(|s| s.kind.rank().is_some())
        .collect();
    // stable sort keeps input order within one kind
    sources.sort_by_key(|s| s.kind.rank());
    sources
}

/// Sources in the order they will be attempted (highest priority first).
#[must_use]
pub fn attempt_order<I, S>(uris: I) -> Vec<SourceUri>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted = sort_sources_by_priority(uris);
    sorted.reverse();
    sorted
}

/// Highest priority source, only if it can be handed to a plain URL consumer.
///
/// Media backends can stream HTTP/FTP URLs directly; any other best source
/// means the file must go through the download controller.
#[must_use]
pub fn simple_source<S: AsRef<str>>(uris: &[S]) -> Option<Url> {
    let sorted = sort_sources_by_priority(uris.iter().map(|u| u.as_ref().to_string()));
    let best = sorted.last()?;
    if best.kind.is_network_url() {
        Url::parse(best.as_str()).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(SourceKind::classify("https://host/f"), SourceKind::Http);
        assert_eq!(SourceKind::classify("http://host/f"), SourceKind::Http);
        assert_eq!(
            SourceKind::classify("xmpp:peer@x?jingle-ft"),
            SourceKind::PeerStream
        );
        assert_eq!(SourceKind::classify("ftp://host/f"), SourceKind::Ftp);
        assert_eq!(SourceKind::classify("cid:abc123"), SourceKind::StoreForward);
        assert_eq!(SourceKind::classify("magnet:?xt=1"), SourceKind::Unknown);
        assert_eq!(SourceKind::classify(""), SourceKind::Unknown);
    }

    #[test]
    fn test_tail_consumption_tries_peer_stream_first() {
        let mut sorted = sort_sources_by_priority([
            "https://host/a",
            "cid:abc",
            "ftp://host/b",
            "gopher://nope",
            "xmpp:peer@x?jingle-ft",
            "http://host/c",
        ]);

        let mut tried = Vec::new();
        while let Some(source) = sorted.pop() {
            tried.push(source.kind());
        }
        assert_eq!(
            tried,
            vec![
                SourceKind::PeerStream,
                SourceKind::StoreForward,
                SourceKind::Ftp,
                SourceKind::Http,
                SourceKind::Http,
            ]
        );
        assert!(!tried.contains(&SourceKind::Unknown));
    }

    #[test]
    fn test_equal_kinds_keep_input_order() {
        let order = attempt_order(["http://one", "http://two"]);
        let uris: Vec<&str> = order.iter().map(SourceUri::as_str).collect();
        // reversed: the later http entry sits at the tail after sorting
        assert_eq!(uris, vec!["http://two", "http://one"]);
    }

    #[test]
    fn test_unknown_only_yields_empty() {
        assert!(sort_sources_by_priority(["mailto:a@b", "urn:x"]).is_empty());
    }

    #[test]
    fn test_simple_source_requires_network_url_on_top() {
        assert_eq!(
            simple_source(&["https://host/f", "ftp://host/g"])
                .map(|u| u.to_string()),
            Some("ftp://host/g".to_string())
        );
        assert!(simple_source(&["https://host/f", "cid:abc"]).is_none());
        assert!(simple_source::<&str>(&[]).is_none());
    }
}
