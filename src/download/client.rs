//! HTTP client wrapper used by the HTTP/FTP transport.
//!
//! The wrapped `reqwest` client is built once and cloned into every HTTP
//! transport so connections are pooled across sources and downloads.

use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, READ_TIMEOUT_SECS};
use crate::config::ShareConfig;

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("fileshare/", env!("CARGO_PKG_VERSION"));

/// HTTP client for range-capable streaming downloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Redirects: followed unless they downgrade from HTTPS
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        debug!(connect_timeout_secs, read_timeout_secs, "building HTTP client");
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .redirect(no_less_safe_redirects())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Creates a client from the sharing configuration.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn from_config(config: &ShareConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Follows redirects unless they leave HTTPS for a less secure scheme.
///
/// A stopped redirect hands the 3xx response back to the transport, which
/// rejects it as an unexpected status.
fn no_less_safe_redirects() -> Policy {
    Policy::custom(|attempt| {
        let hops = attempt.previous().len();
        let downgrade = attempt
            .previous()
            .last()
            .is_some_and(|prev| prev.scheme() == "https")
            && attempt.url().scheme() != "https";
        if hops > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if downgrade {
            debug!(target_url = %attempt.url(), "refusing redirect that downgrades from https");
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}
