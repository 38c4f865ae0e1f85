//! Depot configuration management and validation

use anyhow::{Context, Result};
use fwdepot_cabinet::Compression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix every accepted schema version carries
pub const SCHEMA_PREFIX: &str = "fwdepot.config/";

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "fwdepot.config/1";

/// Complete depot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Configuration schema version
    pub schema_version: String,
    /// Artifact and state directories
    pub storage: StorageConfig,
    /// Signing identity and keyring
    pub signing: SigningConfig,
    /// Upload limits and archive handling
    pub ingest: IngestConfig,
    /// Feed naming and rendering
    pub feed: FeedConfig,
}

/// Directory layout, relative entries resolved against `root`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of all depot state
    pub root: PathBuf,
    /// Uploaded originals
    pub uploads_dir: PathBuf,
    /// Re-serialized, signed distribution archives
    pub downloads_dir: PathBuf,
    /// Compressed feeds and their signatures
    pub feeds_dir: PathBuf,
    /// Repository state
    pub db_dir: PathBuf,
    /// Checkpoint snapshots
    pub checkpoint_dir: PathBuf,
}

/// Signing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Keyring directory
    pub keyring_dir: PathBuf,
    /// Identity used for payload and feed signatures
    pub identity: String,
    /// Upper bound on a single sign or verify call
    pub timeout_secs: u64,
}

/// Archive compression written to the distribution store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// Stored
    None,
    /// MSZIP
    #[default]
    Mszip,
}

impl From<ArchiveCompression> for Compression {
    fn from(value: ArchiveCompression) -> Self {
        match value {
            ArchiveCompression::None => Compression::None,
            ArchiveCompression::Mszip => Compression::Mszip,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Smallest accepted upload in bytes
    pub min_upload_size: u64,
    /// Largest accepted upload in bytes
    pub max_upload_size: u64,
    /// External cabinet decompressor
    pub decompressor_path: PathBuf,
    /// Upper bound on one decompressor run
    pub decompressor_timeout_secs: u64,
    /// Compression of re-serialized archives
    pub compression: ArchiveCompression,
    /// Bound on the total uncompressed archive size
    pub max_uncompressed_size: u64,
}

/// Feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// `origin` attribute of every feed
    pub origin: String,
    /// Salt mixed into group feed filenames
    pub group_salt: String,
    /// Base URL prepended to distribution filenames
    pub download_base_url: String,
    /// Feed of all stable and testing packages
    pub stable_filename: String,
    /// Feed of all testing packages
    pub testing_filename: String,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            storage: StorageConfig::default(),
            signing: SigningConfig::default(),
            ingest: IngestConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/fwdepot"),
            uploads_dir: PathBuf::from("uploads"),
            downloads_dir: PathBuf::from("downloads"),
            feeds_dir: PathBuf::from("feeds"),
            db_dir: PathBuf::from("db"),
            checkpoint_dir: PathBuf::from("checkpoint"),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keyring_dir: PathBuf::from("keyring"),
            identity: "fwdepot".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_upload_size: 1024,
            max_upload_size: 50_000_000,
            decompressor_path: PathBuf::from(fwdepot_cabinet::external::DEFAULT_PROGRAM),
            decompressor_timeout_secs: 30,
            compression: ArchiveCompression::default(),
            max_uncompressed_size: fwdepot_cabinet::reader::DEFAULT_MAX_UNCOMPRESSED_SIZE,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            origin: "fwdepot".to_string(),
            group_salt: "fwdepot-group".to_string(),
            download_base_url: "https://fwdepot.invalid/downloads".to_string(),
            stable_filename: "firmware.xml.gz".to_string(),
            testing_filename: "firmware-testing.xml.gz".to_string(),
        }
    }
}

impl StorageConfig {
    /// Rooted layout under `root` with default sub-directory names
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }

    /// Uploaded originals directory
    pub fn uploads_path(&self) -> PathBuf {
        self.resolve(&self.uploads_dir)
    }

    /// Distribution directory
    pub fn downloads_path(&self) -> PathBuf {
        self.resolve(&self.downloads_dir)
    }

    /// Feed directory
    pub fn feeds_path(&self) -> PathBuf {
        self.resolve(&self.feeds_dir)
    }

    /// Repository state directory
    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.db_dir)
    }

    /// Checkpoint directory
    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.checkpoint_dir)
    }
}

impl SigningConfig {
    /// Signing timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IngestConfig {
    /// Decompressor timeout
    pub fn decompressor_timeout(&self) -> Duration {
        Duration::from_secs(self.decompressor_timeout_secs)
    }
}

impl DepotConfig {
    /// Configuration rooted at `root` with defaults elsewhere
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::rooted(root),
            ..Self::default()
        }
    }

    /// Keyring directory, resolved against the storage root
    pub fn keyring_path(&self) -> PathBuf {
        self.storage.resolve(&self.signing.keyring_dir)
    }

    /// Load configuration from a file, creating a default one when missing
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, creating default");
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: DepotConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save configuration to a file
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Reject inconsistent values
    pub fn validate(&self) -> Result<()> {
        if !self.schema_version.starts_with(SCHEMA_PREFIX) {
            anyhow::bail!("Invalid schema version: {}", self.schema_version);
        }

        if self.signing.identity.trim().is_empty() {
            anyhow::bail!("Signing identity must not be empty");
        }

        if self.signing.timeout_secs == 0 {
            anyhow::bail!("Invalid signing timeout: {} s", self.signing.timeout_secs);
        }

        if self.ingest.decompressor_timeout_secs == 0 {
            anyhow::bail!(
                "Invalid decompressor timeout: {} s",
                self.ingest.decompressor_timeout_secs
            );
        }

        if self.ingest.min_upload_size > self.ingest.max_upload_size {
            anyhow::bail!(
                "Minimum upload size {} exceeds maximum {}",
                self.ingest.min_upload_size,
                self.ingest.max_upload_size
            );
        }

        if self.ingest.max_uncompressed_size == 0 {
            anyhow::bail!("Uncompressed size limit must be positive");
        }

        if self.feed.stable_filename.is_empty()
            || self.feed.testing_filename.is_empty()
            || self.feed.stable_filename == self.feed.testing_filename
        {
            anyhow::bail!(
                "Invalid feed filenames: '{}' and '{}'",
                self.feed.stable_filename,
                self.feed.testing_filename
            );
        }

        for name in [&self.feed.stable_filename, &self.feed.testing_filename] {
            if name.contains(['/', '\\']) {
                anyhow::bail!("Feed filename must not contain a path: {name}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("etc").join("fwdepot.json");

        let config = DepotConfig::load_from_path(&path).await?;
        assert!(path.exists());
        assert_eq!(config, DepotConfig::default());

        let reloaded = DepotConfig::load_from_path(&path).await?;
        assert_eq!(reloaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("fwdepot.json");
        tokio::fs::write(&path, r#"{"feed": {"origin": "lab"}, "ingest": {"compression": "none"}}"#).await?;

        let config = DepotConfig::load_from_path(&path).await?;
        assert_eq!(config.feed.origin, "lab");
        assert_eq!(config.feed.stable_filename, "firmware.xml.gz");
        assert_eq!(config.ingest.compression, ArchiveCompression::None);
        assert_eq!(config.ingest.min_upload_size, 1024);
        config.validate()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("fwdepot.json");
        tokio::fs::write(&path, "{ nope").await?;
        assert!(DepotConfig::load_from_path(&path).await.is_err());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        assert!(DepotConfig::default().validate().is_ok());

        let mut config = DepotConfig::default();
        config.ingest.min_upload_size = 10;
        config.ingest.max_upload_size = 5;
        assert!(config.validate().is_err());

        let mut config = DepotConfig::default();
        config.signing.identity = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = DepotConfig::default();
        config.signing.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DepotConfig::default();
        config.schema_version = "other/1".to_string();
        assert!(config.validate().is_err());

        let mut config = DepotConfig::default();
        config.feed.testing_filename = config.feed.stable_filename.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let mut config = DepotConfig::with_root("/srv/depot");
        config.storage.feeds_dir = PathBuf::from("/var/www/feeds");

        assert_eq!(config.storage.uploads_path(), PathBuf::from("/srv/depot/uploads"));
        assert_eq!(config.storage.feeds_path(), PathBuf::from("/var/www/feeds"));
        assert_eq!(config.keyring_path(), PathBuf::from("/srv/depot/keyring"));
    }
}
