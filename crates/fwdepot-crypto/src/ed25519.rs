//! Ed25519 signature primitives
//!
//! This module provides Ed25519 digital signature functionality for:
//! - Key pair generation and loading
//! - Signing arbitrary data
//! - Strict signature verification
//!
//! # Security Considerations
//!
//! - Key generation uses `OsRng` for cryptographically secure randomness
//! - Key and signature comparison is constant-time

#![deny(clippy::unwrap_used)]

use crate::error::CryptoError;
use crate::utils;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Length of an Ed25519 public key in bytes
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 public key wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    /// Raw public key bytes (32 bytes for Ed25519)
    pub key_bytes: [u8; PUBLIC_KEY_LEN],
    /// Human-readable identifier for this key
    pub identifier: String,
    /// Optional comment or description
    pub comment: Option<String>,
}

impl PublicKey {
    /// Create a new public key from raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN], identifier: String) -> Self {
        Self {
            key_bytes: bytes,
            identifier,
            comment: None,
        }
    }

    /// Create a public key from a byte slice of unchecked length
    pub fn from_slice(bytes: &[u8], identifier: String) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }

        let mut key_bytes = [0u8; PUBLIC_KEY_LEN];
        key_bytes.copy_from_slice(bytes);
        Ok(Self::from_bytes(key_bytes, identifier))
    }

    /// Create a public key with a comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Get the fingerprint of this public key (SHA256 hash in hex)
    pub fn fingerprint(&self) -> String {
        utils::compute_key_fingerprint(&self.key_bytes)
    }

    /// Convert to ed25519_dalek VerifyingKey
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_bytes(&self.key_bytes)
            .map_err(|e| CryptoError::KeyFormatError(format!("Invalid public key: {}", e)))
    }

    /// Compare two public keys in constant time
    pub fn ct_eq(&self, other: &PublicKey) -> bool {
        self.key_bytes.ct_eq(&other.key_bytes).into()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for PublicKey {}

/// Ed25519 signature wrapper
#[derive(Debug, Clone)]
pub struct Signature {
    /// Raw signature bytes (64 bytes for Ed25519)
    pub signature_bytes: [u8; SIGNATURE_LEN],
}

impl Signature {
    /// Create a new signature from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self {
            signature_bytes: bytes,
        }
    }

    /// Create a signature from a byte slice of unchecked length
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }

        let mut signature_bytes = [0u8; SIGNATURE_LEN];
        signature_bytes.copy_from_slice(bytes);
        Ok(Self { signature_bytes })
    }

    /// Encode signature as base64 string
    pub fn to_base64(&self) -> String {
        utils::encode_base64(&self.signature_bytes)
    }

    /// Parse signature from base64 string
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = utils::decode_base64(encoded)?;
        Self::from_slice(&bytes)
    }

    /// Convert to ed25519_dalek Signature
    pub fn to_dalek_signature(&self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.signature_bytes)
    }

    /// Compare two signatures in constant time
    pub fn ct_eq(&self, other: &Signature) -> bool {
        self.signature_bytes.ct_eq(&other.signature_bytes).into()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for Signature {}

/// Ed25519 key pair for signing and verification
#[derive(Debug)]
pub struct KeyPair {
    /// The signing (private) key
    pub signing_key: SigningKey,
    /// The public key derived from the signing key
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random Ed25519 key pair
    ///
    /// Uses the operating system's cryptographically secure random number generator.
    pub fn generate() -> Result<Self, CryptoError> {
        use rand::rngs::OsRng;

        let signing_key = SigningKey::generate(&mut OsRng);
        Ok(Self::from_signing_key(
            signing_key,
            format!("generated-{}", chrono::Utc::now().timestamp()),
        ))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey, identifier: String) -> Self {
        let verifying_key = signing_key.verifying_key();

        let public_key = PublicKey {
            key_bytes: verifying_key.to_bytes(),
            identifier,
            comment: None,
        };

        Self {
            signing_key,
            public_key,
        }
    }

    /// Load a key pair from raw signing key bytes
    pub fn from_bytes(signing_key_bytes: &[u8; 32], identifier: String) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(signing_key_bytes), identifier)
    }

    /// Load a key pair from a base64-encoded 32-byte secret
    pub fn from_base64(encoded: &str, identifier: String) -> Result<Self, CryptoError> {
        let bytes = utils::decode_base64(encoded)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&secret, identifier))
    }

    /// Get the signing key bytes (for secure storage)
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the public key fingerprint
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint()
    }
}

/// Ed25519 signer for creating signatures
pub struct Ed25519Signer;

impl Ed25519Signer {
    /// Sign arbitrary data with a signing key
    pub fn sign(data: &[u8], signing_key: &SigningKey) -> Signature {
        Signature::from_bytes(signing_key.sign(data).to_bytes())
    }
}

/// Ed25519 signature verifier
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    /// Verify an Ed25519 signature against data and public key
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    pub fn verify(
        data: &[u8],
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<bool, CryptoError> {
        let verifying_key = public_key.to_verifying_key()?;
        let dalek_signature = signature.to_dalek_signature();

        Ok(verifying_key.verify_strict(data, &dalek_signature).is_ok())
    }

    /// Parse a public key from base64 string
    pub fn parse_public_key(key_b64: &str, identifier: String) -> Result<PublicKey, CryptoError> {
        let key_bytes = utils::decode_base64(key_b64)?;
        PublicKey::from_slice(&key_bytes, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::generate()?;

        assert_eq!(keypair.public_key.key_bytes.len(), 32);
        assert_eq!(keypair.fingerprint().len(), 64);

        Ok(())
    }

    #[test]
    fn test_sign_and_verify() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::generate()?;
        let data = b"Hello, World!";

        let signature = Ed25519Signer::sign(data, &keypair.signing_key);

        assert!(Ed25519Verifier::verify(data, &signature, &keypair.public_key)?);
        assert!(!Ed25519Verifier::verify(
            b"Wrong data",
            &signature,
            &keypair.public_key
        )?);

        Ok(())
    }

    #[test]
    fn test_signature_base64_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::generate()?;
        let signature = Ed25519Signer::sign(b"Test data", &keypair.signing_key);
        let parsed = Signature::from_base64(&signature.to_base64())?;

        assert!(signature.ct_eq(&parsed));

        Ok(())
    }

    #[test]
    fn test_keypair_from_base64() -> Result<(), Box<dyn std::error::Error>> {
        let original = KeyPair::generate()?;
        let encoded = utils::encode_base64(&original.signing_key_bytes());

        let restored = KeyPair::from_base64(&encoded, "restored".to_string())?;

        assert!(original.public_key.ct_eq(&restored.public_key));
        assert_eq!(restored.public_key.identifier, "restored");

        Ok(())
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(Signature::from_base64(&utils::encode_base64(&[0u8; 32])).is_err());
        assert!(
            Ed25519Verifier::parse_public_key(&utils::encode_base64(&[0u8; 16]), "t".into())
                .is_err()
        );
        assert!(KeyPair::from_base64(&utils::encode_base64(&[1u8; 31]), "t".into()).is_err());
    }

    #[test]
    fn test_constant_time_equality() -> Result<(), Box<dyn std::error::Error>> {
        let keypair1 = KeyPair::generate()?;
        let keypair2 = KeyPair::generate()?;

        assert!(keypair1.public_key.ct_eq(&keypair1.public_key));
        assert!(!keypair1.public_key.ct_eq(&keypair2.public_key));

        let sig1 = Ed25519Signer::sign(b"test", &keypair1.signing_key);
        let sig2 = Ed25519Signer::sign(b"test", &keypair1.signing_key);
        assert!(sig1.ct_eq(&sig2));

        Ok(())
    }
}
