//! Prelude for fwdepot-cabinet

pub use crate::archive::{CabArchive, CabFile, Compression};
pub use crate::error::{CabError, CabResult};
pub use crate::external::ExternalDecompressor;
pub use crate::pattern::MemberPattern;
pub use crate::reader::{ArchiveReader, DEFAULT_MAX_UNCOMPRESSED_SIZE};
