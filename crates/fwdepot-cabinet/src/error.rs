//! Error types for cabinet parsing and writing

use std::time::Duration;
use thiserror::Error;

/// Cabinet errors
#[derive(Error, Debug)]
pub enum CabError {
    /// Structure of the archive is malformed or truncated
    #[error("Corrupt cabinet: {0}")]
    Corrupt(String),

    /// Well-formed archive using a feature this reader does not handle
    #[error("Unsupported cabinet: {0}")]
    Unsupported(String),

    /// Folder uses a compression method the native reader cannot inflate
    #[error("Unsupported cabinet compression: {0}")]
    UnsupportedCompression(String),

    /// Decompressed output exceeded the configured bound
    #[error("Cabinet exceeds size limit of {limit} bytes")]
    LimitExceeded {
        /// Configured limit
        limit: u64,
    },

    /// Archive cannot be represented in the cabinet format
    #[error("Cannot write cabinet: {0}")]
    Unrepresentable(String),

    /// External decompressor did not finish in time
    #[error("External decompressor timed out after {0:?}")]
    DecompressorTimeout(Duration),

    /// External decompressor exited with an error
    #[error("External decompressor failed: {0}")]
    DecompressorFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CabError {
    /// Create a corruption error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Create an unsupported-format error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether repeating the same call may succeed
    ///
    /// Only a decompressor timeout is transient; every other failure is a
    /// property of the input or the host.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DecompressorTimeout(_))
    }

    /// Whether the failure was caused by the submitted bytes
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Corrupt(_)
                | Self::Unsupported(_)
                | Self::UnsupportedCompression(_)
                | Self::LimitExceeded { .. }
        )
    }
}

/// Result type for cabinet operations
pub type CabResult<T> = std::result::Result<T, CabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CabError::DecompressorTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!CabError::corrupt("x").is_retryable());
        assert!(CabError::corrupt("x").is_input_error());
        assert!(CabError::unsupported("multi-cabinet").is_input_error());
        assert!(CabError::UnsupportedCompression("LZX".into()).is_input_error());
        assert!(!CabError::DecompressorFailed("x".into()).is_input_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CabError::corrupt("bad header").to_string(),
            "Corrupt cabinet: bad header"
        );
        assert!(
            CabError::LimitExceeded { limit: 10 }
                .to_string()
                .contains("10")
        );
    }
}
