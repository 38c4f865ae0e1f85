//! MSZIP block codec
//!
//! MSZIP stores each CFDATA block as the two bytes `CK` followed by a raw deflate
//! stream. Back-references may reach up to 32 KiB into the output of earlier
//! blocks of the same folder, so a decoder carries that window between blocks.
//!
//! The window is handed to the inflater by prefixing the block with a stored
//! deflate block holding the previous output; the prefix is dropped from the
//! result afterwards.

use crate::error::{CabError, CabResult};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};

/// Block signature
pub const SIGNATURE: &[u8; 2] = b"CK";

/// Largest uncompressed size of one data block
pub const MAX_BLOCK_SIZE: usize = 32 * 1024;

/// Size of the deflate window shared between blocks
const WINDOW_SIZE: usize = 32 * 1024;

/// Stateful decoder for the data blocks of one folder
#[derive(Debug, Default)]
pub struct MszipDecoder {
    window: Vec<u8>,
}

impl MszipDecoder {
    /// Create a decoder with an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one data block that should inflate to exactly `expected_len` bytes
    pub fn decode_block(&mut self, block: &[u8], expected_len: usize) -> CabResult<Vec<u8>> {
        let deflate = block
            .strip_prefix(SIGNATURE)
            .ok_or_else(|| CabError::corrupt("MSZIP block missing CK signature"))?;

        if expected_len > MAX_BLOCK_SIZE {
            return Err(CabError::corrupt(format!(
                "MSZIP block claims {expected_len} bytes"
            )));
        }

        let mut stream = Vec::with_capacity(5 + self.window.len() + deflate.len());
        let window_len = u16::try_from(self.window.len())
            .map_err(|e| CabError::corrupt(format!("window overflow: {e}")))?;
        // non-final stored block: BFINAL=0, BTYPE=00, byte aligned
        stream.push(0x00);
        stream.extend_from_slice(&window_len.to_le_bytes());
        stream.extend_from_slice(&(!window_len).to_le_bytes());
        stream.extend_from_slice(&self.window);
        stream.extend_from_slice(deflate);

        let limit = self.window.len() + expected_len + 1;
        let mut output = Vec::with_capacity(limit);
        DeflateDecoder::new(stream.as_slice())
            .take(u64::try_from(limit).unwrap_or(u64::MAX))
            .read_to_end(&mut output)
            .map_err(|e| CabError::corrupt(format!("MSZIP inflate failed: {e}")))?;

        let produced = output.split_off(self.window.len().min(output.len()));
        if produced.len() != expected_len {
            return Err(CabError::corrupt(format!(
                "MSZIP block inflated to {} bytes, expected {expected_len}",
                produced.len()
            )));
        }

        self.push_window(&produced);
        Ok(produced)
    }

    fn push_window(&mut self, produced: &[u8]) {
        self.window.extend_from_slice(produced);
        let excess = self.window.len().saturating_sub(WINDOW_SIZE);
        if excess > 0 {
            self.window.drain(..excess);
        }
    }
}

/// Compress one block of at most [`MAX_BLOCK_SIZE`] bytes
///
/// Blocks are compressed independently; they never reference earlier output.
pub fn encode_block(data: &[u8]) -> CabResult<Vec<u8>> {
    if data.len() > MAX_BLOCK_SIZE {
        return Err(CabError::Unrepresentable(format!(
            "MSZIP block of {} bytes",
            data.len()
        )));
    }

    let mut out = SIGNATURE.to_vec();
    let mut encoder = DeflateEncoder::new(&mut out, Compression::best());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let data = b"firmware firmware firmware firmware".repeat(10);
        let block = encode_block(&data)?;
        assert!(block.starts_with(SIGNATURE));

        let mut decoder = MszipDecoder::new();
        assert_eq!(decoder.decode_block(&block, data.len())?, data);
        Ok(())
    }

    #[test]
    fn test_missing_signature() {
        let mut decoder = MszipDecoder::new();
        assert!(matches!(
            decoder.decode_block(b"XX\x03\x00", 0),
            Err(CabError::Corrupt(_))
        ));
    }

    #[test]
    fn test_length_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let block = encode_block(b"abcdef")?;
        let mut decoder = MszipDecoder::new();
        assert!(decoder.decode_block(&block, 5).is_err());

        let mut decoder = MszipDecoder::new();
        assert!(decoder.decode_block(&block, 7).is_err());
        Ok(())
    }

    #[test]
    fn test_window_is_bounded() -> Result<(), Box<dyn std::error::Error>> {
        let mut decoder = MszipDecoder::new();
        for _ in 0..3 {
            let data = vec![7u8; MAX_BLOCK_SIZE];
            let block = encode_block(&data)?;
            decoder.decode_block(&block, data.len())?;
        }
        assert_eq!(decoder.window.len(), WINDOW_SIZE);
        Ok(())
    }

    #[test]
    fn test_oversized_block_rejected() {
        assert!(encode_block(&vec![0u8; MAX_BLOCK_SIZE + 1]).is_err());
    }
}
