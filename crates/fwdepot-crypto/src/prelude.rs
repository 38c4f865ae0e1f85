//! Prelude for fwdepot-crypto
//!
//! This module re-exports the most commonly used types for convenience.
//!
//! # Example
//!
//! ```
//! use fwdepot_crypto::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = KeyPair::generate()?;
//! let digest = utils::compute_sha256_hex(&keypair.public_key.key_bytes);
//! assert_eq!(digest, keypair.fingerprint());
//! # Ok(())
//! # }
//! ```

pub use crate::detached::{self, SignatureInfo};
pub use crate::ed25519::{Ed25519Signer, Ed25519Verifier, KeyPair, PublicKey, Signature};
pub use crate::error::{CryptoError, CryptoResult};
pub use crate::keyring::{Keyring, KeyringStats, TrustEntry};
pub use crate::{TrustLevel, utils};
