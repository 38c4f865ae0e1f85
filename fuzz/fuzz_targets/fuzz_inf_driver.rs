//! Fuzzes INF decoding and driver version extraction.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_inf_driver

#![no_main]

use fwdepot_metainfo::{DriverInfo, InfFile};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(inf) = InfFile::parse(data) {
        let _ = inf.get_optional("Version", "DriverVer");
        let _ = inf.section_names().count();
    }
    if let Ok(driver) = DriverInfo::from_bytes("fuzz.inf", data) {
        let _ = driver.display_version();
    }
});
