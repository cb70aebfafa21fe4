//! Library configuration: storage directories and HTTP timeouts.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Accepted range for timeout values, in seconds.
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A timeout is outside `1..=3600` seconds.
    #[error("invalid value for `{field}`: {value}. Expected range: 1..=3600")]
    TimeoutOutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: u64,
    },

    /// A directory setting is empty.
    #[error("`{field}` must not be empty")]
    EmptyPath {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Directories and timeouts used by the sharing and download layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareConfig {
    /// Output directory for downloaded files and their staging files.
    pub download_dir: PathBuf,
    /// Directory where the cache keeps managed blobs.
    pub cache_dir: PathBuf,
    /// Directory for temporary blobs of in-memory shares.
    pub temp_dir: PathBuf,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout.
    pub read_timeout_secs: u64,
}

impl Default for ShareConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("fileshare");
        Self {
            download_dir: PathBuf::from("."),
            cache_dir: base.join("cache"),
            temp_dir: base.join("tmp"),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl ShareConfig {
    /// Validates directory and timeout values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("download_dir", &self.download_dir),
            ("cache_dir", &self.cache_dir),
            ("temp_dir", &self.temp_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath { field });
            }
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if TIMEOUT_RANGE_SECS.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::TimeoutOutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ShareConfig::default();
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.read_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_timeouts() {
        let config = ShareConfig {
            read_timeout_secs: 0,
            ..ShareConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TimeoutOutOfRange {
                field: "read_timeout_secs",
                value: 0
            })
        );

        let config = ShareConfig {
            connect_timeout_secs: 3601,
            ..ShareConfig::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("connect_timeout_secs"), "Expected field in: {msg}");
    }

    #[test]
    fn test_validate_rejects_empty_directory() {
        let config = ShareConfig {
            cache_dir: PathBuf::new(),
            ..ShareConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyPath { field: "cache_dir" })
        );
    }
}
