//! Detached signatures over arbitrary payloads
//!
//! A detached signature is a small binary envelope stored next to the payload
//! it covers (`firmware.bin.sig`, `firmware.xml.gz.sig`):
//!
//! ```text
//! magic      6 bytes   "FWSIG1"
//! signer_len u16 LE
//! signer     signer_len bytes, UTF-8
//! public_key 32 bytes
//! timestamp  i64 LE, unix seconds
//! signature  64 bytes
//! ```
//!
//! The Ed25519 signature covers a domain-separated message binding every header
//! field to the SHA-256 digest of the payload, so no byte of either the payload or
//! the envelope can change without verification failing. Decoding is strict: the
//! envelope must be consumed exactly.

#![deny(clippy::unwrap_used)]

use crate::TrustLevel;
use crate::ed25519::{Ed25519Signer, Ed25519Verifier, PUBLIC_KEY_LEN, PublicKey, SIGNATURE_LEN, Signature};
use crate::error::{CryptoError, CryptoResult};
use crate::keyring::Keyring;
use crate::utils;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Envelope magic
pub const MAGIC: &[u8; 6] = b"FWSIG1";

/// Domain separator prepended to every signed message
const DOMAIN: &[u8] = b"fwdepot-detached-signature-v1\0";

/// Extension used for detached signature files and archive members
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Longest accepted signer identity
pub const MAX_SIGNER_LEN: usize = 256;

/// Name of the detached signature belonging to `name`
pub fn signature_name(name: &str) -> String {
    format!("{name}.{SIGNATURE_EXTENSION}")
}

/// Information recovered from a verified signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    /// Identity that produced the signature
    pub signer: String,
    /// Fingerprint of the signing key
    pub key_fingerprint: String,
    /// When the signature was made
    pub timestamp: DateTime<Utc>,
}

/// Decoded but not yet verified envelope
#[derive(Debug, Clone)]
struct Envelope {
    signer: String,
    public_key: [u8; PUBLIC_KEY_LEN],
    timestamp: i64,
    signature: Signature,
}

impl Envelope {
    fn signed_message(&self, payload_digest: &[u8; 32]) -> CryptoResult<Vec<u8>> {
        let signer_len = u16::try_from(self.signer.len()).map_err(|e| {
            CryptoError::MalformedSignature(format!("signer identity too long: {e}"))
        })?;

        let mut message = Vec::with_capacity(DOMAIN.len() + 2 + self.signer.len() + 32 + 8 + 32);
        message.extend_from_slice(DOMAIN);
        message.extend_from_slice(&signer_len.to_le_bytes());
        message.extend_from_slice(self.signer.as_bytes());
        message.extend_from_slice(&self.public_key);
        message.extend_from_slice(&self.timestamp.to_le_bytes());
        message.extend_from_slice(payload_digest);
        Ok(message)
    }

    fn encode(&self) -> CryptoResult<Vec<u8>> {
        let signer_len = u16::try_from(self.signer.len()).map_err(|e| {
            CryptoError::MalformedSignature(format!("signer identity too long: {e}"))
        })?;

        let mut out = Vec::with_capacity(MAGIC.len() + 2 + self.signer.len() + 32 + 8 + 64);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&signer_len.to_le_bytes());
        out.extend_from_slice(self.signer.as_bytes());
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.signature.signature_bytes);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> CryptoResult<Self> {
        let mut cursor = Cursor::new(bytes);

        if cursor.take(MAGIC.len())? != MAGIC {
            return Err(CryptoError::MalformedSignature("bad magic".to_string()));
        }

        let signer_len = usize::from(u16::from_le_bytes(cursor.take_array()?));
        if signer_len == 0 || signer_len > MAX_SIGNER_LEN {
            return Err(CryptoError::MalformedSignature(format!(
                "signer identity length {signer_len} out of range"
            )));
        }
        let signer = std::str::from_utf8(cursor.take(signer_len)?)
            .map_err(|e| CryptoError::MalformedSignature(format!("signer not UTF-8: {e}")))?
            .to_string();

        let public_key: [u8; PUBLIC_KEY_LEN] = cursor.take_array()?;
        let timestamp = i64::from_le_bytes(cursor.take_array()?);
        let signature = Signature::from_bytes(cursor.take_array::<SIGNATURE_LEN>()?);

        if !cursor.is_empty() {
            return Err(CryptoError::MalformedSignature(format!(
                "{} trailing bytes",
                cursor.remaining()
            )));
        }

        Ok(Self {
            signer,
            public_key,
            timestamp,
            signature,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, len: usize) -> CryptoResult<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(CryptoError::MalformedSignature("truncated envelope".to_string()));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> CryptoResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Sign `payload` with the signing key registered for `identity`
///
/// # Errors
///
/// Returns [`CryptoError::SigningKeyUnavailable`] when the keyring holds no key for
/// `identity`.
pub fn sign(payload: &[u8], identity: &str, keyring: &Keyring) -> CryptoResult<Vec<u8>> {
    sign_at(payload, identity, keyring, Utc::now())
}

/// Sign `payload` with an explicit timestamp
///
/// Signing the same payload with the same key and timestamp always produces the
/// same envelope.
pub fn sign_at(
    payload: &[u8],
    identity: &str,
    keyring: &Keyring,
    timestamp: DateTime<Utc>,
) -> CryptoResult<Vec<u8>> {
    if identity.is_empty() || identity.len() > MAX_SIGNER_LEN {
        return Err(CryptoError::SigningKeyUnavailable(identity.to_string()));
    }

    let keypair = keyring.signing_key(identity)?;
    let mut envelope = Envelope {
        signer: identity.to_string(),
        public_key: keypair.public_key.key_bytes,
        timestamp: timestamp.timestamp(),
        signature: Signature::from_bytes([0u8; SIGNATURE_LEN]),
    };

    let message = envelope.signed_message(&utils::compute_sha256(payload))?;
    envelope.signature = Ed25519Signer::sign(&message, &keypair.signing_key);

    debug!(
        signer = identity,
        payload_len = payload.len(),
        "Created detached signature"
    );
    envelope.encode()
}

/// Verify a detached signature against `payload`
///
/// The signing key must be present and trusted in `keyring`.
pub fn verify(payload: &[u8], signature: &[u8], keyring: &Keyring) -> CryptoResult<SignatureInfo> {
    let envelope = Envelope::decode(signature)?;

    let public_key = PublicKey::from_bytes(envelope.public_key, envelope.signer.clone());
    let key_fingerprint = public_key.fingerprint();

    match keyring.get_trust_level(&key_fingerprint) {
        TrustLevel::Trusted => {}
        TrustLevel::Unknown => {
            warn!(signer = %envelope.signer, fingerprint = %key_fingerprint, "Signature from unknown key");
            return Err(CryptoError::UntrustedSigner(envelope.signer));
        }
        TrustLevel::Distrusted => {
            warn!(signer = %envelope.signer, fingerprint = %key_fingerprint, "Signature from distrusted key");
            return Err(CryptoError::UntrustedSigner(envelope.signer));
        }
    }

    let message = envelope.signed_message(&utils::compute_sha256(payload))?;
    if !Ed25519Verifier::verify(&message, &envelope.signature, &public_key)? {
        return Err(CryptoError::InvalidSignature);
    }

    let timestamp = Utc
        .timestamp_opt(envelope.timestamp, 0)
        .single()
        .ok_or_else(|| CryptoError::MalformedSignature("timestamp out of range".to_string()))?;

    Ok(SignatureInfo {
        signer: envelope.signer,
        key_fingerprint,
        timestamp,
    })
}
