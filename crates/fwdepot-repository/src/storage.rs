//! File-based artifact storage

use anyhow::Context;
use std::path::{Component, Path, PathBuf};
use tokio::fs as async_fs;
use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

/// Flat directory of named artifacts with atomic replacement
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `base_dir`, creating it if needed
    pub async fn new(base_dir: &Path) -> anyhow::Result<Self> {
        async_fs::create_dir_all(base_dir)
            .await
            .with_context(|| format!("Failed to create storage directory: {}", base_dir.display()))?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of artifact `name`
    ///
    /// Names must be a single normal path component.
    pub fn path_for(&self, name: &str) -> anyhow::Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !name.ends_with(TEMP_SUFFIX) => {
                Ok(self.base_dir.join(name))
            }
            _ => anyhow::bail!("invalid artifact name '{}'", name.escape_default()),
        }
    }

    /// Write `name` atomically
    ///
    /// The content is written to a sibling temporary file which is then renamed
    /// over the target, so readers see either the old or the new content.
    pub async fn write_atomic(&self, name: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.path_for(name)?;
        let temp_path = self.base_dir.join(format!("{name}{TEMP_SUFFIX}"));
        debug!(path = %path.display(), bytes = content.len(), "Writing file atomically");

        async_fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

        if let Err(e) = async_fs::rename(&temp_path, &path).await {
            if let Err(cleanup) = async_fs::remove_file(&temp_path).await {
                debug!(error = %cleanup, "Failed to remove temp file");
            }
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to rename temp file to target: {}", path.display())));
        }

        Ok(path)
    }

    /// Read artifact `name`
    pub async fn read(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(name)?;
        async_fs::read(&path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    /// Read artifact `name`, or `None` when it does not exist
    pub async fn read_optional(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(name)?;
        match async_fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read file: {}", path.display()))),
        }
    }

    /// Check if artifact `name` exists
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|p| p.is_file())
    }

    /// Delete artifact `name`; a missing file is not an error
    pub async fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.path_for(name)?;
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to delete file: {}", path.display()))),
        }
    }

    /// Names of all artifacts, sorted
    ///
    /// Leftover temporary files from interrupted writes are skipped.
    pub async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = async_fs::read_dir(&self.base_dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", self.base_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.ends_with(TEMP_SUFFIX)
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}
