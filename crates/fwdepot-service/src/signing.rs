//! Bounded signing and verification
//!
//! Signing is CPU-bound and runs on the blocking pool; each call is bounded by
//! the configured timeout so no request waits on it indefinitely.

use crate::error::{DepotError, DepotResult};
use fwdepot_crypto::{Keyring, SignatureInfo, detached};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Signs payloads and feeds with one configured identity
#[derive(Debug, Clone)]
pub struct SigningEngine {
    keyring: Arc<Keyring>,
    identity: String,
    timeout: Duration,
}

impl SigningEngine {
    /// Create an engine over `keyring`
    pub fn new(keyring: Keyring, identity: impl Into<String>, timeout: Duration) -> Self {
        Self {
            keyring: Arc::new(keyring),
            identity: identity.into(),
            timeout,
        }
    }

    /// Signing identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Shared keyring
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Fail early when the signing identity has no key
    pub fn ensure_ready(&self) -> DepotResult<()> {
        if self.keyring.has_signing_key(&self.identity) {
            Ok(())
        } else {
            Err(DepotError::SigningKeyUnavailable(self.identity.clone()))
        }
    }

    /// Produce a detached signature over `payload`
    pub async fn sign(&self, payload: Vec<u8>) -> DepotResult<Vec<u8>> {
        let keyring = Arc::clone(&self.keyring);
        let identity = self.identity.clone();
        let len = payload.len();

        let signature = self
            .bounded("signing", move || detached::sign(&payload, &identity, &keyring))
            .await??;

        debug!(bytes = len, identity = %self.identity, "Payload signed");
        Ok(signature)
    }

    /// Verify a detached signature against the trusted keyring
    pub async fn verify(&self, payload: Vec<u8>, signature: Vec<u8>) -> DepotResult<SignatureInfo> {
        let keyring = Arc::clone(&self.keyring);
        let info = self
            .bounded("signature verification", move || {
                detached::verify(&payload, &signature, &keyring)
            })
            .await??;

        info!(signer = %info.signer, fingerprint = %info.key_fingerprint, "Existing signature verified");
        Ok(info)
    }

    async fn bounded<T, F>(&self, operation: &'static str, work: F) -> DepotResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join)) => Err(DepotError::storage(format!("{operation} task failed: {join}"))),
            Err(_elapsed) => Err(DepotError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwdepot_crypto::KeyPair;

    fn engine() -> Result<SigningEngine, Box<dyn std::error::Error>> {
        let mut keyring = Keyring::new_in_memory();
        keyring.add_signing_key("fwdepot", KeyPair::generate()?);
        Ok(SigningEngine::new(keyring, "fwdepot", Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_sign_then_verify() -> Result<(), Box<dyn std::error::Error>> {
        let engine = engine()?;
        engine.ensure_ready()?;

        let signature = engine.sign(b"payload".to_vec()).await?;
        let info = engine.verify(b"payload".to_vec(), signature.clone()).await?;
        assert_eq!(info.signer, "fwdepot");

        assert!(matches!(
            engine.verify(b"payloaD".to_vec(), signature).await,
            Err(DepotError::Trust(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_identity_is_configuration_error() {
        let engine = SigningEngine::new(Keyring::new_in_memory(), "absent", Duration::from_secs(5));
        assert!(matches!(engine.ensure_ready(), Err(DepotError::SigningKeyUnavailable(_))));
        assert!(matches!(
            engine.sign(b"x".to_vec()).await,
            Err(DepotError::SigningKeyUnavailable(id)) if id == "absent"
        ));
    }
}
