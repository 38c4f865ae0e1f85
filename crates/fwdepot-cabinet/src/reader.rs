//! Cabinet parser
//!
//! Supports single-cabinet archives (no spanning), any number of folders,
//! reserve areas, stored and MSZIP folders, and per-block checksums. Folders
//! compressed with Quantum or LZX are reported as
//! [`CabError::UnsupportedCompression`], which lets [`ArchiveReader::read`] hand
//! the archive to an external decompressor when one is configured.

use crate::archive::{ATTR_NAME_IS_UTF, CabArchive, CabFile};
use crate::checksum;
use crate::error::{CabError, CabResult};
use crate::external::ExternalDecompressor;
use crate::mszip::MszipDecoder;
use tracing::{debug, info, warn};

/// Cabinet signature
pub const SIGNATURE: &[u8; 4] = b"MSCF";

/// Default bound on the total uncompressed size of an archive
pub const DEFAULT_MAX_UNCOMPRESSED_SIZE: u64 = 512 * 1024 * 1024;

const FLAG_PREV_CABINET: u16 = 0x0001;
const FLAG_NEXT_CABINET: u16 = 0x0002;
const FLAG_RESERVE_PRESENT: u16 = 0x0004;

/// `iFolder` values at or above this mark files continued across cabinets
const IFOLD_CONTINUED: u16 = 0xFFFD;

/// Longest member name, excluding the terminator
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderCompression {
    None,
    Mszip,
}

#[derive(Debug)]
struct FolderEntry {
    data_offset: usize,
    block_count: u16,
    type_compress: u16,
}

#[derive(Debug)]
struct FileEntry {
    size: u32,
    folder_offset: u32,
    folder: u16,
    date: u16,
    time: u16,
    attributes: u16,
    name: String,
}

/// Little-endian cursor over untrusted bytes
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn seek(&mut self, pos: usize) -> CabResult<()> {
        if pos > self.bytes.len() {
            return Err(CabError::corrupt(format!("offset {pos} beyond end of cabinet")));
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, len: usize) -> CabResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| CabError::corrupt("offset overflow"))?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| CabError::corrupt(format!("truncated at offset {}", self.pos)))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CabResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> CabResult<u8> {
        Ok(u8::from_le_bytes(self.array()?))
    }

    fn u16(&mut self) -> CabResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> CabResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn cstring(&mut self) -> CabResult<&'a [u8]> {
        let rest = self.bytes.get(self.pos..).unwrap_or_default();
        let len = rest
            .iter()
            .take(MAX_NAME_LEN + 1)
            .position(|&b| b == 0)
            .ok_or_else(|| CabError::corrupt("unterminated or overlong member name"))?;
        let name = self.take(len)?;
        self.take(1)?;
        Ok(name)
    }
}

fn offset(value: u32) -> CabResult<usize> {
    usize::try_from(value).map_err(|e| CabError::corrupt(format!("offset {value}: {e}")))
}

/// Configurable cabinet reader
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    max_uncompressed_size: u64,
    decompressor: Option<ExternalDecompressor>,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveReader {
    /// Reader with the default size bound and no external decompressor
    pub fn new() -> Self {
        Self {
            max_uncompressed_size: DEFAULT_MAX_UNCOMPRESSED_SIZE,
            decompressor: None,
        }
    }

    /// Bound the total uncompressed size of an archive
    pub fn with_max_uncompressed_size(mut self, limit: u64) -> Self {
        self.max_uncompressed_size = limit;
        self
    }

    /// Use an external decompressor for formats the native reader rejects
    pub fn with_decompressor(mut self, decompressor: ExternalDecompressor) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    /// Configured size bound
    pub fn max_uncompressed_size(&self) -> u64 {
        self.max_uncompressed_size
    }

    /// Parse an archive, delegating unsupported compression to the external
    /// decompressor when it exists on this host
    pub async fn read(&self, bytes: &[u8]) -> CabResult<CabArchive> {
        match self.parse(bytes) {
            Err(CabError::UnsupportedCompression(kind)) => match &self.decompressor {
                Some(decompressor) if decompressor.is_available() => {
                    info!(compression = %kind, "Delegating cabinet to external decompressor");
                    decompressor.extract(bytes, self.max_uncompressed_size).await
                }
                Some(decompressor) => {
                    warn!(
                        program = %decompressor.program().display(),
                        compression = %kind,
                        "External decompressor not installed"
                    );
                    Err(CabError::UnsupportedCompression(kind))
                }
                None => Err(CabError::UnsupportedCompression(kind)),
            },
            other => other,
        }
    }

    /// Parse an archive using native decompression only
    pub fn parse(&self, bytes: &[u8]) -> CabResult<CabArchive> {
        let mut r = ByteReader::new(bytes);

        if r.take(4).map_err(|e| CabError::corrupt(format!("not a cabinet: {e}")))? != SIGNATURE {
            return Err(CabError::corrupt("not a cabinet: bad signature"));
        }
        r.u32()?; // reserved1
        let cb_cabinet = offset(r.u32()?)?;
        r.u32()?; // reserved2
        let coff_files = offset(r.u32()?)?;
        r.u32()?; // reserved3
        let version_minor = r.u8()?;
        let version_major = r.u8()?;
        let folder_count = r.u16()?;
        let file_count = r.u16()?;
        let flags = r.u16()?;
        r.u16()?; // setID
        r.u16()?; // iCabinet

        if version_major != 1 {
            return Err(CabError::unsupported(format!(
                "cabinet version {version_major}.{version_minor}"
            )));
        }
        if flags & (FLAG_PREV_CABINET | FLAG_NEXT_CABINET) != 0 {
            return Err(CabError::unsupported("multi-cabinet sets"));
        }

        let bytes = bytes.get(..cb_cabinet).ok_or_else(|| {
            CabError::corrupt(format!(
                "header declares {cb_cabinet} bytes, only {} present",
                bytes.len()
            ))
        })?;
        let mut r = ByteReader {
            bytes,
            pos: r.pos,
        };

        let (folder_reserve, data_reserve) = if flags & FLAG_RESERVE_PRESENT != 0 {
            let header_reserve = r.u16()?;
            let folder_reserve = r.u8()?;
            let data_reserve = r.u8()?;
            r.take(usize::from(header_reserve))?;
            (usize::from(folder_reserve), usize::from(data_reserve))
        } else {
            (0, 0)
        };

        let mut folders = Vec::with_capacity(usize::from(folder_count));
        for _ in 0..folder_count {
            let data_offset = offset(r.u32()?)?;
            let block_count = r.u16()?;
            let type_compress = r.u16()?;
            r.take(folder_reserve)?;
            folders.push(FolderEntry {
                data_offset,
                block_count,
                type_compress,
            });
        }

        r.seek(coff_files)?;
        let mut entries = Vec::with_capacity(usize::from(file_count));
        let mut declared: u64 = 0;
        for _ in 0..file_count {
            let entry = read_file_entry(&mut r)?;
            if entry.folder >= IFOLD_CONTINUED {
                return Err(CabError::unsupported(format!(
                    "member '{}' continues across cabinets",
                    entry.name
                )));
            }
            if usize::from(entry.folder) >= folders.len() {
                return Err(CabError::corrupt(format!(
                    "member '{}' references folder {}",
                    entry.name, entry.folder
                )));
            }
            declared = declared.saturating_add(u64::from(entry.size));
            entries.push(entry);
        }

        if declared > self.max_uncompressed_size {
            return Err(CabError::LimitExceeded {
                limit: self.max_uncompressed_size,
            });
        }

        let mut budget = self.max_uncompressed_size;
        let mut folder_data: Vec<Option<Vec<u8>>> = Vec::with_capacity(folders.len());
        for (index, folder) in folders.iter().enumerate() {
            let used = entries.iter().any(|e| usize::from(e.folder) == index);
            if used {
                let data = self.read_folder(bytes, folder, data_reserve, &mut budget)?;
                folder_data.push(Some(data));
            } else {
                folder_data.push(None);
            }
        }

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let data = folder_data
                .get(usize::from(entry.folder))
                .and_then(Option::as_ref)
                .ok_or_else(|| CabError::corrupt("missing folder data"))?;
            let start = offset(entry.folder_offset)?;
            let end = start
                .checked_add(offset(entry.size)?)
                .ok_or_else(|| CabError::corrupt("member extent overflow"))?;
            let contents = data.get(start..end).ok_or_else(|| {
                CabError::corrupt(format!(
                    "member '{}' extends beyond its folder ({end} > {})",
                    entry.name,
                    data.len()
                ))
            })?;

            files.push(CabFile {
                name: entry.name,
                data: contents.to_vec(),
                date: entry.date,
                time: entry.time,
                attributes: entry.attributes & !ATTR_NAME_IS_UTF,
            });
        }

        debug!(
            folders = folders.len(),
            files = files.len(),
            size = cb_cabinet,
            "Parsed cabinet"
        );
        Ok(CabArchive::from_files(files))
    }

    fn read_folder(
        &self,
        bytes: &[u8],
        folder: &FolderEntry,
        data_reserve: usize,
        budget: &mut u64,
    ) -> CabResult<Vec<u8>> {
        let compression = match folder.type_compress & 0x000F {
            0 => FolderCompression::None,
            1 => FolderCompression::Mszip,
            2 => return Err(CabError::UnsupportedCompression("Quantum".to_string())),
            3 => return Err(CabError::UnsupportedCompression("LZX".to_string())),
            other => {
                return Err(CabError::unsupported(format!("compression type {other}")));
            }
        };

        let mut r = ByteReader::new(bytes);
        r.seek(folder.data_offset)?;

        let mut decoder = MszipDecoder::new();
        let mut output = Vec::new();

        for index in 0..folder.block_count {
            let csum = r.u32()?;
            let cb_data = r.u16()?;
            let cb_uncomp = r.u16()?;
            r.take(data_reserve)?;
            let data = r.take(usize::from(cb_data))?;

            if csum != 0 && csum != checksum::data_block(data, cb_data, cb_uncomp) {
                return Err(CabError::corrupt(format!("checksum mismatch in data block {index}")));
            }
            if cb_uncomp == 0 {
                return Err(CabError::corrupt(format!("data block {index} is empty")));
            }

            *budget = budget.checked_sub(u64::from(cb_uncomp)).ok_or(CabError::LimitExceeded {
                limit: self.max_uncompressed_size,
            })?;

            match compression {
                FolderCompression::None => {
                    if cb_data != cb_uncomp {
                        return Err(CabError::corrupt(format!(
                            "stored block {index} has {cb_data} bytes, declares {cb_uncomp}"
                        )));
                    }
                    output.extend_from_slice(data);
                }
                FolderCompression::Mszip => {
                    let block = decoder.decode_block(data, usize::from(cb_uncomp))?;
                    output.extend_from_slice(&block);
                }
            }
        }

        Ok(output)
    }
}

fn read_file_entry(r: &mut ByteReader<'_>) -> CabResult<FileEntry> {
    let size = r.u32()?;
    let folder_offset = r.u32()?;
    let folder = r.u16()?;
    let date = r.u16()?;
    let time = r.u16()?;
    let attributes = r.u16()?;
    let raw_name = r.cstring()?;

    if raw_name.is_empty() {
        return Err(CabError::corrupt("member with empty name"));
    }

    let name = if attributes & ATTR_NAME_IS_UTF != 0 {
        String::from_utf8(raw_name.to_vec())
            .map_err(|e| CabError::corrupt(format!("member name is not UTF-8: {e}")))?
    } else {
        raw_name.iter().copied().map(char::from).collect()
    };

    Ok(FileEntry {
        size,
        folder_offset,
        folder,
        date,
        time,
        attributes,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Compression;

    fn sample_bytes(compression: Compression) -> Result<Vec<u8>, CabError> {
        let mut archive = CabArchive::new();
        archive.add_file(CabFile::new("firmware.bin", vec![0x5a; 70_000]));
        archive.add_file(CabFile::new("firmware.inf", b"[Version]\r\nClass=Firmware\r\n".to_vec()));
        archive.save(compression)
    }

    #[test]
    fn test_rejects_non_cabinet() {
        assert!(matches!(CabArchive::parse(b"PK\x03\x04"), Err(CabError::Corrupt(_))));
        assert!(matches!(CabArchive::parse(b""), Err(CabError::Corrupt(_))));
    }

    #[test]
    fn test_rejects_truncation() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = sample_bytes(Compression::Mszip)?;
        for len in [10, 36, 50, bytes.len() - 1] {
            let result = CabArchive::parse(bytes.get(..len).ok_or("short")?);
            assert!(matches!(result, Err(CabError::Corrupt(_))), "len {len}");
        }
        Ok(())
    }

    #[test]
    fn test_detects_checksum_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = sample_bytes(Compression::None)?;
        let last = bytes.len() - 1;
        if let Some(b) = bytes.get_mut(last) {
            *b ^= 0xff;
        }
        assert!(matches!(CabArchive::parse(&bytes), Err(CabError::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn test_rejects_multi_cabinet() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = sample_bytes(Compression::None)?;
        // flags live at offset 30
        if let Some(b) = bytes.get_mut(30) {
            *b |= 0x02;
        }
        assert!(matches!(CabArchive::parse(&bytes), Err(CabError::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn test_reports_lzx_as_unsupported_compression() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = sample_bytes(Compression::None)?;
        // typeCompress of the first folder lives at offset 36 + 6
        if let Some(b) = bytes.get_mut(42) {
            *b = 3;
        }
        assert!(matches!(
            CabArchive::parse(&bytes),
            Err(CabError::UnsupportedCompression(_))
        ));
        Ok(())
    }

    #[test]
    fn test_size_limit() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = sample_bytes(Compression::Mszip)?;
        let reader = ArchiveReader::new().with_max_uncompressed_size(1024);
        assert!(matches!(
            reader.parse(&bytes),
            Err(CabError::LimitExceeded { limit: 1024 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_without_decompressor_keeps_error() -> Result<(), Box<dyn std::error::Error>> {
        let mut bytes = sample_bytes(Compression::None)?;
        if let Some(b) = bytes.get_mut(42) {
            *b = 2;
        }
        let reader = ArchiveReader::new().with_decompressor(ExternalDecompressor::new(
            "/nonexistent/cabextract",
            std::time::Duration::from_secs(1),
        ));
        assert!(matches!(
            reader.read(&bytes).await,
            Err(CabError::UnsupportedCompression(_))
        ));
        Ok(())
    }
}
