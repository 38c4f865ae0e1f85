//! Read cache over published artifacts
//!
//! Maps a published path such as `downloads/<name>` or `feeds/<name>` to its
//! digest and size so existence and metadata checks avoid the artifact store.

use fwdepot_crypto::utils::compute_sha256_hex;
use fwdepot_repository::FileStorage;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Cached metadata for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// SHA-256 of the file contents
    pub sha256: String,
    /// Size in bytes
    pub size: u64,
}

impl CacheEntry {
    /// Entry describing `content`
    pub fn for_content(content: &[u8]) -> Self {
        Self {
            sha256: compute_sha256_hex(content),
            size: content.len() as u64,
        }
    }
}

/// Store prefix of distribution archives
pub const DOWNLOADS_PREFIX: &str = "downloads";

/// Store prefix of feeds and feed signatures
pub const FEEDS_PREFIX: &str = "feeds";

/// Cache key of `name` in store `prefix`
pub fn cache_key(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// In-memory path to digest map
#[derive(Debug, Default)]
pub struct FileCache {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl FileCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for `key`
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Whether `key` is cached
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Whether `key` is cached with exactly this digest
    pub fn matches(&self, key: &str, sha256: &str) -> bool {
        self.entries.read().get(key).is_some_and(|e| e.sha256 == sha256)
    }

    /// Record `content` under `key`
    pub fn put(&self, key: String, content: &[u8]) -> CacheEntry {
        let entry = CacheEntry::for_content(content);
        self.entries.write().insert(key, entry.clone());
        entry
    }

    /// Evict `key`
    pub fn evict(&self, key: &str) -> Option<CacheEntry> {
        self.entries.write().remove(key)
    }

    /// Number of cached files
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all entries, ordered by key
    pub fn entries(&self) -> BTreeMap<String, CacheEntry> {
        self.entries.read().clone()
    }

    /// Re-derive every entry from the given stores
    ///
    /// The new map is built off-lock and swapped in whole.
    pub async fn rebuild(&self, stores: &[(&str, &FileStorage)]) -> anyhow::Result<usize> {
        let mut fresh = BTreeMap::new();
        for (prefix, storage) in stores {
            for name in storage.list().await? {
                let content = storage.read(&name).await?;
                debug!(prefix, name = %name, bytes = content.len(), "Caching file");
                fresh.insert(cache_key(prefix, &name), CacheEntry::for_content(&content));
            }
        }

        let count = fresh.len();
        *self.entries.write() = fresh;
        info!(entries = count, "File cache rebuilt");
        Ok(count)
    }
}
