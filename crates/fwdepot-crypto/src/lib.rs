//! Content hashing and detached signatures for fwdepot
//!
//! This crate provides the checksum and signing engine used by the ingestion
//! pipeline and the feed aggregator:
//! - SHA-256 content hashing (package identity, payload and container checksums)
//! - Ed25519 key pairs, signing and verification
//! - A keyring holding trusted public keys and the service signing keys
//! - A strict binary envelope for detached signatures
//!
//! # Architecture
//!
//! - [`ed25519`]: Ed25519 signing and verification operations
//! - [`keyring`]: Trusted keys and signing identities
//! - [`detached`]: Detached signature envelopes over arbitrary payloads
//! - [`error`]: Error types for cryptographic operations
//!
//! # Security Considerations
//!
//! - All key and signature comparisons use constant-time operations via the `subtle` crate
//! - Verification uses `verify_strict`, rejecting malleable signatures and weak keys
//! - A detached signature binds the signer identity, key and timestamp, so no
//!   header byte can be altered without failing verification
//!
//! # Example
//!
//! ```
//! use fwdepot_crypto::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut keyring = Keyring::new_in_memory();
//! keyring.add_signing_key("depot", KeyPair::generate()?);
//!
//! let payload = b"firmware payload";
//! let signature = detached::sign(payload, "depot", &keyring)?;
//! let info = detached::verify(payload, &signature, &keyring)?;
//! assert_eq!(info.signer, "depot");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod detached;
pub mod ed25519;
pub mod error;
pub mod keyring;
pub mod prelude;

pub use detached::SignatureInfo;
pub use ed25519::{Ed25519Signer, Ed25519Verifier, KeyPair, PublicKey, Signature};
pub use error::{CryptoError, CryptoResult};
pub use keyring::{Keyring, KeyringStats, TrustEntry};

/// Trust level for a public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrustLevel {
    /// Explicitly trusted (operator keyring or a service signing key)
    Trusted,
    /// Unknown signer (not in keyring)
    Unknown,
    /// Explicitly distrusted
    Distrusted,
}

/// Hashing and encoding helpers shared by every crate in the workspace
pub mod utils {
    use crate::error::CryptoError;
    use sha2::{Digest, Sha256};

    /// Length of a hex-encoded SHA-256 digest
    pub const SHA256_HEX_LEN: usize = 64;

    /// Compute SHA256 hash of data and return as hex string
    pub fn compute_sha256_hex(data: &[u8]) -> String {
        hex::encode(compute_sha256(data))
    }

    /// Compute SHA256 hash of data
    pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Compute SHA256 fingerprint of a public key
    pub fn compute_key_fingerprint(public_key: &[u8]) -> String {
        compute_sha256_hex(public_key)
    }

    /// Salted one-way hash used to derive public names from private identifiers
    ///
    /// The output has a fixed length regardless of the input, so the original
    /// value cannot be guessed from a published file name.
    pub fn obfuscate(salt: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check whether a string is a lowercase hex SHA-256 digest
    pub fn is_sha256_hex(value: &str) -> bool {
        value.len() == SHA256_HEX_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Encode bytes as base64 (Standard alphabet with padding)
    pub fn encode_base64(data: &[u8]) -> String {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        STANDARD.encode(data)
    }

    /// Decode base64 to bytes
    pub fn decode_base64(data: &str) -> Result<Vec<u8>, CryptoError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        STANDARD.decode(data.trim()).map_err(CryptoError::from)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_sha256_known_vector() {
            assert_eq!(
                compute_sha256_hex(b"abc"),
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            );
        }

        #[test]
        fn test_obfuscate_is_fixed_length_and_salted() {
            let a = obfuscate("salt", "vendor-a");
            let b = obfuscate("pepper", "vendor-a");
            assert_eq!(a.len(), SHA256_HEX_LEN);
            assert_ne!(a, b);
            assert_eq!(a, obfuscate("salt", "vendor-a"));
        }

        #[test]
        fn test_is_sha256_hex() {
            assert!(is_sha256_hex(&compute_sha256_hex(b"x")));
            assert!(!is_sha256_hex("abc"));
            assert!(!is_sha256_hex(&"G".repeat(SHA256_HEX_LEN)));
            assert!(!is_sha256_hex(&"A".repeat(SHA256_HEX_LEN)));
        }
    }
}
