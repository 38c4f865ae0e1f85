//! Error types for cryptographic operations

#![deny(clippy::unwrap_used)]

use thiserror::Error;

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Untrusted signer
    #[error("Untrusted signer: {0}")]
    UntrustedSigner(String),

    /// Detached signature envelope could not be decoded
    #[error("Malformed detached signature: {0}")]
    MalformedSignature(String),

    /// Key format error
    #[error("Key format error: {0}")]
    KeyFormatError(String),

    /// No signing key is available for the requested identity
    #[error("Signing key unavailable for identity '{0}'")]
    SigningKeyUnavailable(String),

    /// I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Keyring error
    #[error("Keyring error: {0}")]
    KeyringError(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid signature length
    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key not found in keyring
    #[error("Key not found in keyring: {0}")]
    KeyNotFound(String),
}

impl CryptoError {
    /// Whether this error means a signature could not be trusted
    ///
    /// Configuration failures (missing signing key, unreadable keyring) are not
    /// trust failures and are reported separately by callers.
    pub fn is_trust_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::UntrustedSigner(_)
                | Self::MalformedSignature(_)
                | Self::InvalidSignatureLength { .. }
                | Self::KeyFormatError(_)
        )
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(e: serde_json::Error) -> Self {
        CryptoError::SerializationError(e.to_string())
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::KeyFormatError(format!("Base64 decode error: {}", e))
    }
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
