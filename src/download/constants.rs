//! Constants for the download module (timeouts, staging, buffering).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Maximum redirects followed for one HTTP source.
pub const MAX_REDIRECTS: usize = 10;

/// Prefix of the staging file written next to the destination.
pub const STAGING_PREFIX: &str = "dl-";

/// Depth of the channel between a transport worker and the controller.
///
/// Workers block once this many chunks are waiting, so a slow reader
/// throttles the network side.
pub const FEED_CHANNEL_DEPTH: usize = 16;

/// Error text when the source list is empty or exhausted without any error.
pub const NO_SOURCES_ERROR: &str = "Download sources are not given";

/// Error text for a source kind no transport handles.
pub const UNHANDLED_SOURCE_ERROR: &str = "Unhandled downloader";
