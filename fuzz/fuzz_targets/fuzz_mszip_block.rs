//! Fuzzes MSZIP block decoding, including the window carried across blocks.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_mszip_block

#![no_main]

use fwdepot_cabinet::mszip::{MAX_BLOCK_SIZE, MszipDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&len_byte, rest)) = data.split_first() else {
        return;
    };
    let expected_len = (usize::from(len_byte) * 128).min(MAX_BLOCK_SIZE);

    let mut decoder = MszipDecoder::new();
    let (first, second) = rest.split_at(rest.len() / 2);
    let _ = decoder.decode_block(first, expected_len);
    let _ = decoder.decode_block(second, expected_len);
});
