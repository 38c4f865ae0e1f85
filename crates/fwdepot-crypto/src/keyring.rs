//! Keyring management for fwdepot
//!
//! A keyring holds two kinds of material:
//! - trusted public keys, used to verify signatures that arrive inside uploads
//! - signing identities, the private keys the service signs payloads and feeds with
//!
//! On disk a keyring is a directory:
//!
//! ```text
//! <keyring>/trusted.json        fingerprint -> TrustEntry
//! <keyring>/signing/<id>.key    base64 encoded 32-byte Ed25519 secret
//! ```
//!
//! Key generation is not the keyring's job; keys are provisioned externally and
//! only loaded here. The public half of every signing identity is trusted
//! implicitly.

#![deny(clippy::unwrap_used)]

use crate::TrustLevel;
use crate::ed25519::{KeyPair, PublicKey};
use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File holding the trusted public keys
pub const TRUSTED_KEYS_FILE: &str = "trusted.json";

/// Directory holding signing identities
pub const SIGNING_KEYS_DIR: &str = "signing";

/// Extension of a signing identity file
pub const SIGNING_KEY_EXTENSION: &str = "key";

/// Keyring entry for a public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEntry {
    /// The public key
    pub public_key: PublicKey,
    /// Trust level for this key
    pub trust_level: TrustLevel,
    /// When this entry was added
    pub added_at: chrono::DateTime<chrono::Utc>,
    /// Optional reason for trust/distrust
    pub reason: Option<String>,
    /// Whether this entry belongs to a loaded signing identity
    pub signing_identity: bool,
}

/// Trusted keys and signing identities
pub struct Keyring {
    /// Map from key fingerprint to trust entry
    entries: HashMap<String, TrustEntry>,
    /// Map from identity name to key pair
    signing_keys: HashMap<String, KeyPair>,
    /// Keyring directory (None for in-memory)
    keyring_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("trusted", &self.entries.len())
            .field("identities", &self.signing_keys.keys().collect::<Vec<_>>())
            .field("keyring_dir", &self.keyring_dir)
            .finish()
    }
}

impl Keyring {
    /// Open a keyring directory
    ///
    /// A missing directory yields an empty keyring: verification will then
    /// reject every signature and signing will report the identity as unavailable.
    pub fn open(keyring_dir: impl Into<PathBuf>) -> CryptoResult<Self> {
        let keyring_dir = keyring_dir.into();
        let mut keyring = Self {
            entries: HashMap::new(),
            signing_keys: HashMap::new(),
            keyring_dir: Some(keyring_dir.clone()),
        };

        if !keyring_dir.exists() {
            warn!(keyring = ?keyring_dir, "Keyring directory does not exist");
            return Ok(keyring);
        }

        let trusted_path = keyring_dir.join(TRUSTED_KEYS_FILE);
        if trusted_path.exists() {
            keyring.load_trusted(&trusted_path)?;
        }

        let signing_dir = keyring_dir.join(SIGNING_KEYS_DIR);
        if signing_dir.is_dir() {
            keyring.load_signing_keys(&signing_dir)?;
        }

        info!(
            keyring = ?keyring_dir,
            trusted = keyring.entries.len(),
            identities = keyring.signing_keys.len(),
            "Keyring loaded"
        );
        Ok(keyring)
    }

    /// Create a new in-memory keyring (for testing)
    pub fn new_in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            signing_keys: HashMap::new(),
            keyring_dir: None,
        }
    }

    fn load_trusted(&mut self, path: &Path) -> CryptoResult<()> {
        let content = std::fs::read_to_string(path)?;
        let entries: HashMap<String, TrustEntry> = serde_json::from_str(&content)?;

        for (fingerprint, entry) in entries {
            if entry.public_key.fingerprint() != fingerprint {
                return Err(CryptoError::KeyringError(format!(
                    "fingerprint mismatch for key '{}'",
                    entry.public_key.identifier
                )));
            }
            self.entries.insert(fingerprint, entry);
        }

        Ok(())
    }

    fn load_signing_keys(&mut self, dir: &Path) -> CryptoResult<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SIGNING_KEY_EXTENSION) {
                continue;
            }
            let Some(identity) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let encoded = std::fs::read_to_string(&path)?;
            let keypair = KeyPair::from_base64(&encoded, identity.to_string())?;
            debug!(identity, fingerprint = %keypair.fingerprint(), "Loaded signing identity");
            self.add_signing_key(identity, keypair);
        }

        Ok(())
    }

    /// Persist the trusted keys to `trusted.json`
    ///
    /// Signing identities are never written back; they are provisioned externally.
    pub fn save(&self) -> CryptoResult<()> {
        let Some(dir) = &self.keyring_dir else {
            return Ok(());
        };

        std::fs::create_dir_all(dir)?;

        let persisted: HashMap<&String, &TrustEntry> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.signing_identity)
            .collect();
        let content = serde_json::to_string_pretty(&persisted)?;

        let path = dir.join(TRUSTED_KEYS_FILE);
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Register a signing identity; its public key becomes trusted
    pub fn add_signing_key(&mut self, identity: &str, keypair: KeyPair) {
        let mut public_key = keypair.public_key.clone();
        public_key.identifier = identity.to_string();

        self.entries.insert(
            public_key.fingerprint(),
            TrustEntry {
                public_key,
                trust_level: TrustLevel::Trusted,
                added_at: chrono::Utc::now(),
                reason: Some("service signing identity".to_string()),
                signing_identity: true,
            },
        );
        self.signing_keys.insert(identity.to_string(), keypair);
    }

    /// Look up the key pair for a signing identity
    pub fn signing_key(&self, identity: &str) -> CryptoResult<&KeyPair> {
        self.signing_keys
            .get(identity)
            .ok_or_else(|| CryptoError::SigningKeyUnavailable(identity.to_string()))
    }

    /// Whether a signing identity is loaded
    pub fn has_signing_key(&self, identity: &str) -> bool {
        self.signing_keys.contains_key(identity)
    }

    /// Add a public key with the given trust level
    pub fn add_key(&mut self, public_key: PublicKey, trust_level: TrustLevel, reason: Option<String>) {
        self.entries.insert(
            public_key.fingerprint(),
            TrustEntry {
                public_key,
                trust_level,
                added_at: chrono::Utc::now(),
                reason,
                signing_identity: false,
            },
        );
    }

    /// Remove a public key
    pub fn remove_key(&mut self, key_fingerprint: &str) -> CryptoResult<bool> {
        if let Some(entry) = self.entries.get(key_fingerprint)
            && entry.signing_identity
        {
            return Err(CryptoError::KeyringError(
                "cannot remove the key of a loaded signing identity".to_string(),
            ));
        }

        Ok(self.entries.remove(key_fingerprint).is_some())
    }

    /// Get a public key by fingerprint
    pub fn get_public_key(&self, key_fingerprint: &str) -> Option<&PublicKey> {
        self.entries
            .get(key_fingerprint)
            .map(|entry| &entry.public_key)
    }

    /// Get trust level for a key
    pub fn get_trust_level(&self, key_fingerprint: &str) -> TrustLevel {
        self.entries
            .get(key_fingerprint)
            .map(|entry| entry.trust_level)
            .unwrap_or(TrustLevel::Unknown)
    }

    /// Get keyring statistics
    pub fn stats(&self) -> KeyringStats {
        let mut stats = KeyringStats {
            signing_identities: self.signing_keys.len(),
            ..KeyringStats::default()
        };

        for entry in self.entries.values() {
            match entry.trust_level {
                TrustLevel::Trusted => stats.trusted_keys += 1,
                TrustLevel::Unknown => stats.unknown_keys += 1,
                TrustLevel::Distrusted => stats.distrusted_keys += 1,
            }
        }

        stats
    }

    /// Keyring directory, if file-backed
    pub fn keyring_dir(&self) -> Option<&Path> {
        self.keyring_dir.as_deref()
    }
}

/// Statistics about a keyring
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyringStats {
    /// Number of trusted keys
    pub trusted_keys: usize,
    /// Number of unknown keys
    pub unknown_keys: usize,
    /// Number of distrusted keys
    pub distrusted_keys: usize,
    /// Number of loaded signing identities
    pub signing_identities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_keyring_is_empty() {
        let keyring = Keyring::new_in_memory();
        assert_eq!(keyring.stats(), KeyringStats::default());
        assert!(matches!(
            keyring.signing_key("depot"),
            Err(CryptoError::SigningKeyUnavailable(_))
        ));
    }

    #[test]
    fn test_signing_identity_is_trusted() -> Result<(), Box<dyn std::error::Error>> {
        let mut keyring = Keyring::new_in_memory();
        let keypair = KeyPair::generate()?;
        let fingerprint = keypair.fingerprint();

        keyring.add_signing_key("depot", keypair);

        assert!(keyring.has_signing_key("depot"));
        assert_eq!(keyring.get_trust_level(&fingerprint), TrustLevel::Trusted);
        assert!(keyring.remove_key(&fingerprint).is_err());
        Ok(())
    }

    #[test]
    fn test_add_and_remove_key() -> Result<(), Box<dyn std::error::Error>> {
        let mut keyring = Keyring::new_in_memory();
        let key = PublicKey::from_bytes([3u8; 32], "vendor".to_string());
        let fingerprint = key.fingerprint();

        keyring.add_key(key, TrustLevel::Distrusted, Some("revoked".to_string()));
        assert_eq!(keyring.get_trust_level(&fingerprint), TrustLevel::Distrusted);
        assert_eq!(keyring.stats().distrusted_keys, 1);

        assert!(keyring.remove_key(&fingerprint)?);
        assert_eq!(keyring.get_trust_level(&fingerprint), TrustLevel::Unknown);
        Ok(())
    }

    #[test]
    fn test_open_directory() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let signing_dir = temp_dir.path().join(SIGNING_KEYS_DIR);
        std::fs::create_dir_all(&signing_dir)?;

        let keypair = KeyPair::generate()?;
        std::fs::write(
            signing_dir.join("depot.key"),
            utils::encode_base64(&keypair.signing_key_bytes()),
        )?;
        std::fs::write(signing_dir.join("README"), "ignored")?;

        let mut keyring = Keyring::open(temp_dir.path())?;
        assert!(keyring.has_signing_key("depot"));
        assert_eq!(keyring.stats().signing_identities, 1);

        let vendor = PublicKey::from_bytes([9u8; 32], "vendor".to_string());
        let vendor_fp = vendor.fingerprint();
        keyring.add_key(vendor, TrustLevel::Trusted, None);
        keyring.save()?;

        let reopened = Keyring::open(temp_dir.path())?;
        assert_eq!(reopened.get_trust_level(&vendor_fp), TrustLevel::Trusted);
        assert_eq!(
            reopened.get_trust_level(&keypair.fingerprint()),
            TrustLevel::Trusted
        );
        Ok(())
    }

    #[test]
    fn test_open_missing_directory() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let keyring = Keyring::open(temp_dir.path().join("absent"))?;
        assert!(!keyring.has_signing_key("depot"));
        Ok(())
    }

    #[test]
    fn test_open_rejects_corrupt_key() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let signing_dir = temp_dir.path().join(SIGNING_KEYS_DIR);
        std::fs::create_dir_all(&signing_dir)?;
        std::fs::write(signing_dir.join("depot.key"), "not base64!")?;

        assert!(Keyring::open(temp_dir.path()).is_err());
        Ok(())
    }
}
