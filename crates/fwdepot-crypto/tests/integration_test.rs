//! Integration tests for fwdepot-crypto
//!
//! These tests verify end-to-end signing and verification against keyrings.

use fwdepot_crypto::keyring::SIGNING_KEYS_DIR;
use fwdepot_crypto::prelude::*;
use proptest::prelude::*;
use tempfile::TempDir;

fn depot_keyring() -> Result<Keyring, CryptoError> {
    let mut keyring = Keyring::new_in_memory();
    keyring.add_signing_key("depot", KeyPair::generate()?);
    Ok(keyring)
}

mod sign_verify_roundtrip {
    use super::*;

    #[test]
    fn test_file_backed_keyring_cycle() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let signing_dir = temp_dir.path().join(SIGNING_KEYS_DIR);
        std::fs::create_dir_all(&signing_dir)?;

        let keypair = KeyPair::generate()?;
        std::fs::write(
            signing_dir.join("depot.key"),
            utils::encode_base64(&keypair.signing_key_bytes()),
        )?;

        let keyring = Keyring::open(temp_dir.path())?;
        let payload = b"firmware image contents";
        let signature = detached::sign(payload, "depot", &keyring)?;

        let info = detached::verify(payload, &signature, &keyring)?;
        assert_eq!(info.signer, "depot");
        assert_eq!(info.key_fingerprint, keypair.fingerprint());

        Ok(())
    }

    #[test]
    fn test_vendor_signature_trusted_via_public_key() -> Result<(), Box<dyn std::error::Error>> {
        let vendor_key = KeyPair::generate()?;
        let vendor_public = vendor_key.public_key.clone();
        let mut vendor = Keyring::new_in_memory();
        vendor.add_signing_key("vendor", vendor_key);

        let payload = b"vendor firmware";
        let signature = detached::sign(payload, "vendor", &vendor)?;

        let mut service = depot_keyring()?;
        assert!(detached::verify(payload, &signature, &service).is_err());

        service.add_key(vendor_public, TrustLevel::Trusted, Some("vendor".into()));
        assert_eq!(detached::verify(payload, &signature, &service)?.signer, "vendor");

        Ok(())
    }

    #[test]
    fn test_distrusted_key_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let signer_keypair = KeyPair::generate()?;
        let public = signer_keypair.public_key.clone();

        let mut signer = Keyring::new_in_memory();
        signer.add_signing_key("vendor", signer_keypair);
        let signature = detached::sign(b"data", "vendor", &signer)?;

        let mut verifier = Keyring::new_in_memory();
        verifier.add_key(public, TrustLevel::Distrusted, Some("revoked".into()));

        let result = detached::verify(b"data", &signature, &verifier);
        assert!(matches!(result, Err(CryptoError::UntrustedSigner(_))));

        Ok(())
    }
}

mod tamper_detection {
    use super::*;

    #[test]
    fn test_empty_signature_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let keyring = depot_keyring()?;
        let result = detached::verify(b"data", &[], &keyring);
        assert!(matches!(result, Err(CryptoError::MalformedSignature(_))));
        Ok(())
    }

    #[test]
    fn test_foreign_bytes_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let keyring = depot_keyring()?;
        let result = detached::verify(b"data", b"-----BEGIN PGP SIGNATURE-----", &keyring);
        assert!(result.is_err());
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_payload_roundtrips(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
            let keyring = depot_keyring()
                .map_err(|e| TestCaseError::fail(format!("keyring: {e}")))?;
            let signature = detached::sign(&payload, "depot", &keyring)
                .map_err(|e| TestCaseError::fail(format!("sign: {e}")))?;

            prop_assert!(detached::verify(&payload, &signature, &keyring).is_ok());
        }

        #[test]
        fn prop_payload_byte_flip_detected(
            payload in prop::collection::vec(any::<u8>(), 1..512),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let keyring = depot_keyring()
                .map_err(|e| TestCaseError::fail(format!("keyring: {e}")))?;
            let signature = detached::sign(&payload, "depot", &keyring)
                .map_err(|e| TestCaseError::fail(format!("sign: {e}")))?;

            let mut tampered = payload.clone();
            let i = index.index(tampered.len());
            if let Some(byte) = tampered.get_mut(i) {
                *byte ^= mask;
            }

            prop_assert!(detached::verify(&tampered, &signature, &keyring).is_err());
        }

        #[test]
        fn prop_signature_byte_flip_detected(
            payload in prop::collection::vec(any::<u8>(), 0..512),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let keyring = depot_keyring()
                .map_err(|e| TestCaseError::fail(format!("keyring: {e}")))?;
            let mut signature = detached::sign(&payload, "depot", &keyring)
                .map_err(|e| TestCaseError::fail(format!("sign: {e}")))?;

            let i = index.index(signature.len());
            if let Some(byte) = signature.get_mut(i) {
                *byte ^= mask;
            }

            prop_assert!(detached::verify(&payload, &signature, &keyring).is_err());
        }
    }
}
