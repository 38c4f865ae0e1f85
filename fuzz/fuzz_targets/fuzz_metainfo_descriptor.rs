//! Fuzzes component descriptor parsing and validation.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_metainfo_descriptor

#![no_main]

use fwdepot_metainfo::{Component, validate_descriptor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = validate_descriptor("fuzz.metainfo.xml", data);
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(component) = Component::parse(text) {
            let _ = component.validate();
            let _ = component.release();
        }
    }
});
