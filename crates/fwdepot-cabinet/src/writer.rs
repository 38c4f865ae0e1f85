//! Cabinet serializer
//!
//! Writes every member into a single folder, split into data blocks of at most
//! 32 KiB uncompressed, each carrying a checksum. Output depends only on the
//! members and the requested compression, so saving the same archive twice
//! yields identical bytes.

use crate::archive::{ATTR_NAME_IS_UTF, CabArchive, Compression};
use crate::checksum;
use crate::error::{CabError, CabResult};
use crate::mszip::{self, MAX_BLOCK_SIZE};
use crate::reader::SIGNATURE;

const HEADER_SIZE: usize = 36;
const FOLDER_SIZE: usize = 8;
const FILE_ENTRY_SIZE: usize = 16;
const DATA_HEADER_SIZE: usize = 8;
const MAX_NAME_LEN: usize = 255;

fn to_u32(value: usize, what: &str) -> CabResult<u32> {
    u32::try_from(value)
        .map_err(|e| CabError::Unrepresentable(format!("{what} of {value} bytes: {e}")))
}

fn to_u16(value: usize, what: &str) -> CabResult<u16> {
    u16::try_from(value).map_err(|e| CabError::Unrepresentable(format!("{value} {what}: {e}")))
}

struct Block {
    data: Vec<u8>,
    uncompressed: u16,
}

pub(crate) fn write(archive: &CabArchive, compression: Compression) -> CabResult<Vec<u8>> {
    let files = archive.files();
    let file_count = to_u16(files.len(), "members")?;

    let mut stream = Vec::with_capacity(files.iter().map(|f| f.data.len()).sum());
    let mut entries_size = 0usize;
    for file in files {
        let name_len = file.name.len();
        if name_len == 0 || name_len > MAX_NAME_LEN || file.name.contains('\0') {
            return Err(CabError::Unrepresentable(format!(
                "member name '{}'",
                file.name.escape_default()
            )));
        }
        entries_size += FILE_ENTRY_SIZE + name_len + 1;
        stream.extend_from_slice(&file.data);
    }
    to_u32(stream.len(), "folder")?;

    let blocks = stream
        .chunks(MAX_BLOCK_SIZE)
        .map(|chunk| {
            let data = match compression {
                Compression::None => chunk.to_vec(),
                Compression::Mszip => mszip::encode_block(chunk)?,
            };
            Ok(Block {
                data,
                uncompressed: to_u16(chunk.len(), "block bytes")?,
            })
        })
        .collect::<CabResult<Vec<_>>>()?;
    let block_count = to_u16(blocks.len(), "data blocks")?;

    let coff_files = HEADER_SIZE + FOLDER_SIZE;
    let coff_cab_start = coff_files + entries_size;
    let cb_cabinet = coff_cab_start
        + blocks
            .iter()
            .map(|b| DATA_HEADER_SIZE + b.data.len())
            .sum::<usize>();

    let mut out = Vec::with_capacity(cb_cabinet);

    // CFHEADER
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&to_u32(cb_cabinet, "cabinet")?.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&to_u32(coff_files, "header")?.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(3); // versionMinor
    out.push(1); // versionMajor
    out.extend_from_slice(&1u16.to_le_bytes()); // cFolders
    out.extend_from_slice(&file_count.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&0u16.to_le_bytes()); // setID
    out.extend_from_slice(&0u16.to_le_bytes()); // iCabinet

    // CFFOLDER
    let type_compress: u16 = match compression {
        Compression::None => 0,
        Compression::Mszip => 1,
    };
    out.extend_from_slice(&to_u32(coff_cab_start, "header")?.to_le_bytes());
    out.extend_from_slice(&block_count.to_le_bytes());
    out.extend_from_slice(&type_compress.to_le_bytes());

    // CFFILE
    let mut folder_offset = 0usize;
    for file in files {
        let mut attributes = file.attributes & !ATTR_NAME_IS_UTF;
        if !file.name.is_ascii() {
            attributes |= ATTR_NAME_IS_UTF;
        }

        out.extend_from_slice(&to_u32(file.data.len(), "member")?.to_le_bytes());
        out.extend_from_slice(&to_u32(folder_offset, "folder")?.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // iFolder
        out.extend_from_slice(&file.date.to_le_bytes());
        out.extend_from_slice(&file.time.to_le_bytes());
        out.extend_from_slice(&attributes.to_le_bytes());
        out.extend_from_slice(file.name.as_bytes());
        out.push(0);

        folder_offset += file.data.len();
    }

    // CFDATA
    for block in &blocks {
        let cb_data = to_u16(block.data.len(), "compressed block bytes")?;
        let csum = checksum::data_block(&block.data, cb_data, block.uncompressed);
        out.extend_from_slice(&csum.to_le_bytes());
        out.extend_from_slice(&cb_data.to_le_bytes());
        out.extend_from_slice(&block.uncompressed.to_le_bytes());
        out.extend_from_slice(&block.data);
    }

    debug_assert_eq!(out.len(), cb_cabinet);
    Ok(out)
}
