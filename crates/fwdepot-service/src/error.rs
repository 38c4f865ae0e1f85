//! Error taxonomy of the depot core

use fwdepot_cabinet::CabError;
use fwdepot_crypto::CryptoError;
use fwdepot_metainfo::MetainfoError;
use fwdepot_repository::{PermissionError, RepositoryError};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Rejected submission data
///
/// Always user-visible; the request is rejected with no state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Driver-info or descriptor rejected
    #[error(transparent)]
    Metadata(#[from] MetainfoError),

    /// Archive holds no component descriptor
    #[error("The firmware file had no valid metadata")]
    NoDescriptor,

    /// Declared payload is not inside the archive
    #[error("No {filename} found in the archive")]
    PayloadMissing {
        /// Declared content filename
        filename: String,
    },

    /// Upload carried no bytes
    #[error("No data")]
    UploadEmpty,

    /// Upload below the accepted size
    #[error("Firmware is too small: {size} bytes, minimum {min}")]
    UploadTooSmall {
        /// Uploaded size
        size: u64,
        /// Configured minimum
        min: u64,
    },

    /// Upload above the accepted size
    #[error("Firmware is too large: {size} bytes, maximum {max}")]
    UploadTooLarge {
        /// Uploaded size
        size: u64,
        /// Configured maximum
        max: u64,
    },

    /// Uncompressed archive contents exceed the configured bound
    #[error("Archive expands beyond {limit} bytes")]
    ArchiveLimitExceeded {
        /// Configured limit
        limit: u64,
    },

    /// Archive could not be written back out
    #[error("Archive cannot be re-saved: {0}")]
    Unrepresentable(String),
}

/// Errors surfaced by every depot operation
#[derive(Error, Debug)]
pub enum DepotError {
    /// Malformed or inconsistent submitted data
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Archive structure is malformed
    #[error("Corrupt archive: {0}")]
    Corruption(String),

    /// Valid archive using an unsupported feature
    #[error("Unsupported archive: {0}")]
    UnsupportedFormat(String),

    /// Package hash already present
    #[error("{0}")]
    DuplicateIdentity(String),

    /// Device GUID and version already shipped
    #[error("{0}")]
    DuplicateDeviceVersion(String),

    /// Component identifier bound to another device
    #[error("{0}")]
    IdentifierReassigned(String),

    /// Signature verification failed
    #[error("Signature not trusted: {0}")]
    Trust(String),

    /// No key available for the signing identity
    #[error("Signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    /// Actor lacks the required capability
    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] PermissionError),

    /// Package or artifact does not exist
    #[error("{0}")]
    NotFound(String),

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Configured bound
        after: Duration,
    },

    /// Filesystem or state failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DepotError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the failure was caused by the submitted data
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Corruption(_)
                | Self::UnsupportedFormat(_)
                | Self::DuplicateIdentity(_)
                | Self::DuplicateDeviceVersion(_)
                | Self::IdentifierReassigned(_)
        )
    }

    /// Whether the failure points at broken service configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::SigningKeyUnavailable(_))
    }
}

impl From<MetainfoError> for DepotError {
    fn from(err: MetainfoError) -> Self {
        Self::Validation(ValidationError::Metadata(err))
    }
}

impl From<CabError> for DepotError {
    fn from(err: CabError) -> Self {
        match err {
            CabError::Corrupt(msg) => Self::Corruption(msg),
            CabError::DecompressorFailed(msg) => Self::Corruption(format!("external decompressor: {msg}")),
            CabError::Unsupported(msg) | CabError::UnsupportedCompression(msg) => Self::UnsupportedFormat(msg),
            CabError::LimitExceeded { limit } => Self::Validation(ValidationError::ArchiveLimitExceeded { limit }),
            CabError::Unrepresentable(msg) => Self::Validation(ValidationError::Unrepresentable(msg)),
            CabError::DecompressorTimeout(after) => Self::Timeout {
                operation: "archive extraction",
                after,
            },
            CabError::Io(e) => Self::Storage(format!("archive I/O: {e}")),
        }
    }
}

impl From<CryptoError> for DepotError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::SigningKeyUnavailable(identity) => Self::SigningKeyUnavailable(identity),
            other if other.is_trust_failure() => {
                error!(error = %other, "Signature verification failed");
                Self::Trust(other.to_string())
            }
            other => Self::Storage(format!("keyring: {other}")),
        }
    }
}

impl From<RepositoryError> for DepotError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateIdentity(_) => Self::DuplicateIdentity(err.to_string()),
            RepositoryError::DuplicateDeviceVersion { .. } => Self::DuplicateDeviceVersion(err.to_string()),
            RepositoryError::IdentifierReassigned { .. } => Self::IdentifierReassigned(err.to_string()),
            RepositoryError::NotFound(_) | RepositoryError::InvalidPackageId(_) => Self::NotFound(err.to_string()),
            RepositoryError::EmptyPackage(_) => Self::Validation(ValidationError::NoDescriptor),
            RepositoryError::InvalidTarget(_)
            | RepositoryError::ImmutableField { .. }
            | RepositoryError::UnsupportedSchema(_)
            | RepositoryError::Serialization(_)
            | RepositoryError::Storage(_) => Self::Storage(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for DepotError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

/// Result type for depot operations
pub type DepotResult<T> = std::result::Result<T, DepotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_errors_map_to_taxonomy() {
        assert!(matches!(DepotError::from(CabError::corrupt("bad")), DepotError::Corruption(_)));
        assert!(matches!(
            DepotError::from(CabError::UnsupportedCompression("LZX".into())),
            DepotError::UnsupportedFormat(_)
        ));
        assert!(matches!(
            DepotError::from(CabError::LimitExceeded { limit: 5 }),
            DepotError::Validation(ValidationError::ArchiveLimitExceeded { limit: 5 })
        ));

        let timeout = DepotError::from(CabError::DecompressorTimeout(Duration::from_secs(3)));
        assert!(timeout.is_retryable());
        assert!(!DepotError::from(CabError::corrupt("bad")).is_retryable());
    }

    #[test]
    fn test_crypto_errors_split_trust_from_configuration() {
        let missing = DepotError::from(CryptoError::SigningKeyUnavailable("fwdepot".into()));
        assert!(matches!(missing, DepotError::SigningKeyUnavailable(_)));
        assert!(missing.is_configuration_error());

        assert!(matches!(DepotError::from(CryptoError::InvalidSignature), DepotError::Trust(_)));
        assert!(matches!(
            DepotError::from(CryptoError::KeyringError("unreadable".into())),
            DepotError::Storage(_)
        ));
    }

    #[test]
    fn test_repository_errors_keep_message() {
        let err = DepotError::from(RepositoryError::DuplicateIdentity("abc".into()));
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "A firmware file with hash abc already exists");

        assert!(matches!(
            DepotError::from(RepositoryError::NotFound("abc".into())),
            DepotError::NotFound(_)
        ));
    }

    #[test]
    fn test_metadata_errors_are_validation() {
        let err = DepotError::from(MetainfoError::NoReleases);
        assert!(matches!(err, DepotError::Validation(ValidationError::Metadata(MetainfoError::NoReleases))));
        assert!(err.is_user_error());
    }
}
