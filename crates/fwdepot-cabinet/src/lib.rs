//! Microsoft cabinet archives for fwdepot
//!
//! Firmware is uploaded as a cabinet holding the payload, an INF driver
//! description and one or more AppStream metainfo documents. This crate reads
//! such archives from untrusted bytes, looks members up by name or pattern, and
//! writes them back after members have been added.
//!
//! # Architecture
//!
//! - [`archive`]: [`CabArchive`] and [`CabFile`], the in-memory model
//! - [`reader`]: header/folder/file parsing and folder decompression
//! - [`writer`]: single-folder serializer
//! - [`mszip`]: MSZIP block codec with the cross-block window
//! - [`checksum`]: CFDATA checksum
//! - [`pattern`]: glob member name matching
//! - [`external`]: fallback to a `cabextract`-compatible helper
//!
//! # Example
//!
//! ```
//! use fwdepot_cabinet::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut archive = CabArchive::new();
//! archive.add_file(CabFile::new("firmware.bin", vec![0xde, 0xad]));
//! let bytes = archive.save(Compression::Mszip)?;
//!
//! let parsed = CabArchive::parse(&bytes)?;
//! assert!(parsed.find_matching("*.bin").is_some());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod archive;
pub mod checksum;
pub mod error;
pub mod external;
pub mod mszip;
pub mod pattern;
pub mod prelude;
pub mod reader;
mod writer;

pub use archive::{CabArchive, CabFile, Compression};
pub use error::{CabError, CabResult};
pub use external::ExternalDecompressor;
pub use reader::ArchiveReader;
