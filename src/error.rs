//! Error types for the block cache.

use std::io;

use thiserror::Error;

/// The result type used throughout the block cache.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for block cache operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An invalid factor combination or out-of-range configuration value.
    ///
    /// Raised only while building a [`CacheConfig`](crate::CacheConfig); a
    /// cache is never constructed from a configuration that fails here.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An eviction pass could not free as many bytes as it set out to.
    ///
    /// Never returned from the public cache API. The eviction scheduler logs
    /// it, [`CacheStats::incomplete_evictions`](crate::CacheStats) counts it,
    /// and the next trigger retries.
    #[error("Eviction incomplete: freed {bytes_freed} of {bytes_to_free} bytes")]
    EvictionIncomplete {
        /// Bytes the pass needed to free to reach the minimum watermark.
        bytes_to_free: u64,
        /// Bytes the pass actually freed.
        bytes_freed: u64,
    },

    /// An I/O error occurred (e.g. the eviction thread could not be spawned).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A property document could not be deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("minFactor must be smaller than acceptableFactor");
        assert_eq!(
            err.to_string(),
            "Configuration error: minFactor must be smaller than acceptableFactor"
        );

        let err = Error::EvictionIncomplete { bytes_to_free: 250, bytes_freed: 200 };
        assert_eq!(err.to_string(), "Eviction incomplete: freed 200 of 250 bytes");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "spawn failed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
