//! CFDATA block checksum
//!
//! The cabinet checksum XORs the input as little-endian 32-bit words. A trailing
//! partial word is folded in with its bytes in reverse significance. The checksum
//! stored in a data block covers the payload first, then the block's
//! `cbData`/`cbUncomp` header words, seeded with the payload result.

/// Compute the cabinet checksum of `data` with the given seed
pub fn compute(data: &[u8], seed: u32) -> u32 {
    let mut csum = seed;
    let mut chunks = data.chunks_exact(4);

    for word in chunks.by_ref() {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(word);
        csum ^= u32::from_le_bytes(bytes);
    }

    let tail = chunks.remainder().iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    csum ^ tail
}

/// Checksum stored in a CFDATA header
///
/// `cb_data` must be the length of `compressed`.
pub fn data_block(compressed: &[u8], cb_data: u16, cb_uncomp: u16) -> u32 {
    let payload = compute(compressed, 0);
    let [d0, d1] = cb_data.to_le_bytes();
    let [u0, u1] = cb_uncomp.to_le_bytes();
    compute(&[d0, d1, u0, u1], payload)
}
