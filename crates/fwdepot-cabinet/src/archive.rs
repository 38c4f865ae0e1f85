//! In-memory cabinet model

use crate::error::CabResult;
use crate::pattern::MemberPattern;
use crate::reader::ArchiveReader;
use crate::writer;
use std::path::Path;
use tracing::debug;

/// DOS date of 1980-01-01, used for members without a timestamp
pub const DEFAULT_DOS_DATE: u16 = 0x0021;

/// `_A_ARCH` attribute
pub const ATTR_ARCHIVE: u16 = 0x20;

/// `_A_NAME_IS_UTF` attribute
pub const ATTR_NAME_IS_UTF: u16 = 0x80;

/// Folder compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Stored
    None,
    /// Deflate with the `CK` block framing
    #[default]
    Mszip,
}

/// One archive member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabFile {
    /// Member name as stored, using `\` separators if any
    pub name: String,
    /// Uncompressed contents
    pub data: Vec<u8>,
    /// DOS date
    pub date: u16,
    /// DOS time
    pub time: u16,
    /// DOS attributes (without the UTF-8 name flag, which is derived)
    pub attributes: u16,
}

impl CabFile {
    /// Create a member with a deterministic timestamp
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            date: DEFAULT_DOS_DATE,
            time: 0,
            attributes: ATTR_ARCHIVE,
        }
    }

    /// Name without any leading directory components
    pub fn basename(&self) -> &str {
        self.name
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(self.name.as_str())
    }
}

/// A parsed or under-construction cabinet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CabArchive {
    files: Vec<CabFile>,
}

impl CabArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse cabinet bytes with the default limits, native decompression only
    pub fn parse(bytes: &[u8]) -> CabResult<Self> {
        ArchiveReader::new().parse(bytes)
    }

    pub(crate) fn from_files(files: Vec<CabFile>) -> Self {
        Self { files }
    }

    /// Members in archive order
    pub fn files(&self) -> &[CabFile] {
        &self.files
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the archive has no members
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Find a member by exact name
    pub fn find_file(&self, name: &str) -> Option<&CabFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Find the first member whose name matches a glob pattern
    ///
    /// A malformed pattern matches nothing.
    pub fn find_matching(&self, pattern: &str) -> Option<&CabFile> {
        let pattern = MemberPattern::new(pattern).ok()?;
        self.files.iter().find(|f| pattern.matches(&f.name))
    }

    /// Find every member whose name matches a glob pattern
    ///
    /// A malformed pattern matches nothing.
    pub fn find_files(&self, pattern: &str) -> Vec<&CabFile> {
        let Ok(pattern) = MemberPattern::new(pattern) else {
            return Vec::new();
        };
        self.files.iter().filter(|f| pattern.matches(&f.name)).collect()
    }

    /// Add a member, replacing any existing member of the same name in place
    pub fn add_file(&mut self, file: CabFile) {
        match self.files.iter_mut().find(|f| f.name == file.name) {
            Some(existing) => {
                debug!(name = %file.name, "Replacing cabinet member");
                *existing = file;
            }
            None => self.files.push(file),
        }
    }

    /// Remove a member by exact name
    pub fn remove_file(&mut self, name: &str) -> Option<CabFile> {
        let index = self.files.iter().position(|f| f.name == name)?;
        Some(self.files.remove(index))
    }

    /// Total uncompressed size of all members
    pub fn uncompressed_size(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }

    /// Serialize to cabinet bytes
    pub fn save(&self, compression: Compression) -> CabResult<Vec<u8>> {
        writer::write(self, compression)
    }

    /// Serialize and atomically write to `path`
    pub async fn write_to(&self, path: &Path, compression: Compression) -> CabResult<()> {
        let bytes = self.save(compression)?;
        let temp_path = path.with_extension("cab.tmp");
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, path).await?;
        debug!(path = %path.display(), size = bytes.len(), "Wrote cabinet");
        Ok(())
    }
}
