//! Fuzzes detached signature verification against an empty keyring.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_signature_envelope

#![no_main]

use fwdepot_crypto::Keyring;
use fwdepot_crypto::detached::verify;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let keyring = Keyring::new_in_memory();
    let (payload, signature) = data.split_at(data.len() / 2);
    // Arbitrary envelopes must be rejected, never accepted or panicked on.
    assert!(verify(payload, signature, &keyring).is_err());
});
