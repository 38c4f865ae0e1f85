//! Fuzzes the in-process cabinet reader with arbitrary upload bytes.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_cab_parse

#![no_main]

use fwdepot_cabinet::ArchiveReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let reader = ArchiveReader::new().with_max_uncompressed_size(1024 * 1024);
    // Must never panic; a parsed archive must re-save.
    if let Ok(archive) = reader.parse(data) {
        let _ = archive.save(fwdepot_cabinet::Compression::None);
        let _ = archive.find_matching("*.metainfo.xml");
    }
});
