//! Feed aggregation
//!
//! A feed is an AppStream collection holding, for every device GUID visible to
//! an audience, the newest component shipping firmware for it. Output is
//! deterministic: GUIDs are emitted in lexicographic order and the gzip
//! wrapper carries no timestamp or file name, so rebuilding an unchanged
//! audience reproduces the published bytes exactly.

use crate::cache::{FEEDS_PREFIX, FileCache, cache_key};
use crate::config::FeedConfig;
use crate::error::{DepotError, DepotResult};
use crate::signing::SigningEngine;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use fwdepot_crypto::detached::signature_name;
use fwdepot_crypto::utils::{compute_sha256_hex, obfuscate};
use fwdepot_crypto::SignatureInfo;
use fwdepot_metainfo::prelude::{CHECKSUM_KIND_SHA256, CHECKSUM_TARGET_CONTAINER, CHECKSUM_TARGET_CONTENT};
use fwdepot_repository::{Audience, ComponentRecord, FileStorage, FirmwarePackage, RepositoryState};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// AppStream collection version written to every feed
pub const COLLECTION_VERSION: &str = "0.9";

/// Feed file suffix
pub const FEED_SUFFIX: &str = ".xml.gz";

/// Feed file name of `audience`
///
/// Group names are obfuscated so a group's feed cannot be located by guessing.
pub fn feed_filename(config: &FeedConfig, audience: &Audience) -> String {
    match audience {
        Audience::Group(group) => format!("firmware-{}{FEED_SUFFIX}", obfuscate(&config.group_salt, group)),
        Audience::StableAndTesting => config.stable_filename.clone(),
        Audience::Testing => config.testing_filename.clone(),
    }
}

/// One component chosen for a feed
#[derive(Debug, Clone, Copy)]
pub struct FeedEntry<'a> {
    /// Package shipping the component
    pub package: &'a FirmwarePackage,
    /// The component
    pub component: &'a ComponentRecord,
}

impl FeedEntry<'_> {
    fn is_newer_than(&self, other: &FeedEntry<'_>) -> bool {
        (self.package.submitted_at, &self.package.package_id)
            > (other.package.submitted_at, &other.package.package_id)
    }
}

/// Newest component per device GUID among packages visible to `audience`
///
/// Ties on submission time go to the larger package identifier.
pub fn select_latest<'a>(state: &'a RepositoryState, audience: &Audience) -> BTreeMap<&'a str, FeedEntry<'a>> {
    select_latest_where(state, |p| audience.includes_package(p))
}

/// Newest component per device GUID among packages accepted by `include`
pub fn select_latest_where<'a, F>(state: &'a RepositoryState, include: F) -> BTreeMap<&'a str, FeedEntry<'a>>
where
    F: Fn(&FirmwarePackage) -> bool,
{
    let mut latest: BTreeMap<&str, FeedEntry<'_>> = BTreeMap::new();
    for package in state.packages().filter(|p| include(p)) {
        for component in &package.components {
            let candidate = FeedEntry { package, component };
            let replace = latest
                .get(component.device_guid.as_str())
                .is_none_or(|current| candidate.is_newer_than(current));
            if replace {
                latest.insert(component.device_guid.as_str(), candidate);
            }
        }
    }
    latest
}

struct XmlFeedWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlFeedWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> DepotResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| DepotError::storage(format!("feed serialization failed: {e}")))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> DepotResult<()> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.emit(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> DepotResult<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> DepotResult<()> {
        self.start(name, attributes)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Element whose content is already-escaped markup
    fn markup_element(&mut self, name: &str, markup: &str) -> DepotResult<()> {
        self.start(name, &[])?;
        self.emit(Event::Text(BytesText::from_escaped(markup)))?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        bytes
    }
}

fn write_component(xml: &mut XmlFeedWriter, config: &FeedConfig, entry: &FeedEntry<'_>) -> DepotResult<()> {
    let FeedEntry { package, component } = *entry;

    xml.start("component", &[("type", "firmware")])?;
    xml.text_element("id", &[], &component.component_id)?;
    xml.text_element("name", &[], &component.name)?;
    xml.text_element("summary", &[], &component.summary)?;
    if let Some(description) = &component.description {
        xml.markup_element("description", description)?;
    }
    xml.start("provides", &[])?;
    xml.text_element("firmware", &[("type", "flashed")], &component.device_guid)?;
    xml.end("provides")?;
    if let Some(homepage) = &component.homepage {
        xml.text_element("url", &[("type", "homepage")], homepage)?;
    }
    xml.text_element("metadata_license", &[], &component.metadata_license)?;
    xml.text_element("project_license", &[], &component.project_license)?;
    xml.text_element("developer_name", &[], &component.developer_name)?;

    let timestamp = component.release_timestamp.map(|t| t.to_string());
    let mut release_attributes = vec![("version", component.version.as_str())];
    if let Some(timestamp) = &timestamp {
        release_attributes.push(("timestamp", timestamp.as_str()));
    }

    let location = format!(
        "{}/{}",
        config.download_base_url.trim_end_matches('/'),
        package.stored_filename
    );
    let installed = component.installed_size.to_string();
    let download = component.download_size.to_string();

    xml.start("releases", &[])?;
    xml.start("release", &release_attributes)?;
    xml.text_element("location", &[], &location)?;
    if let Some(description) = &component.release_description {
        xml.markup_element("description", description)?;
    }
    xml.text_element(
        "checksum",
        &[
            ("filename", package.stored_filename.as_str()),
            ("target", CHECKSUM_TARGET_CONTAINER),
            ("type", CHECKSUM_KIND_SHA256),
        ],
        &component.container_checksum,
    )?;
    xml.text_element(
        "checksum",
        &[
            ("filename", component.content_filename.as_str()),
            ("target", CHECKSUM_TARGET_CONTENT),
            ("type", CHECKSUM_KIND_SHA256),
        ],
        &component.content_checksum,
    )?;
    xml.text_element("size", &[("type", "installed")], &installed)?;
    xml.text_element("size", &[("type", "download")], &download)?;
    xml.end("release")?;
    xml.end("releases")?;
    xml.end("component")
}

/// Serialize the selected components as an AppStream collection
pub fn render_xml<'a>(
    config: &FeedConfig,
    entries: impl IntoIterator<Item = FeedEntry<'a>>,
) -> DepotResult<Vec<u8>> {
    let mut xml = XmlFeedWriter::new();
    xml.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.start(
        "components",
        &[("origin", config.origin.as_str()), ("version", COLLECTION_VERSION)],
    )?;
    for entry in entries {
        write_component(&mut xml, config, &entry)?;
    }
    xml.end("components")?;
    Ok(xml.finish())
}

/// Gzip with no timestamp or embedded file name
pub fn compress(xml: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::best());
    encoder.write_all(xml)?;
    encoder.finish()
}

/// Inflate a compressed feed
pub fn decompress(feed: &[u8]) -> std::io::Result<String> {
    let mut xml = String::new();
    GzDecoder::new(feed).read_to_string(&mut xml)?;
    Ok(xml)
}

/// Render the compressed feed of `audience` from `state`
pub fn render_feed(config: &FeedConfig, state: &RepositoryState, audience: &Audience) -> DepotResult<Vec<u8>> {
    let latest = select_latest(state, audience);
    let xml = render_xml(config, latest.into_values())?;
    compress(&xml).map_err(|e| DepotError::storage(format!("feed compression failed: {e}")))
}

/// A rendered, signed feed waiting to be published
#[derive(Debug, Clone)]
pub struct StagedFeed {
    /// Audience the feed belongs to
    pub audience: Audience,
    /// Feed file name
    pub filename: String,
    /// Compressed feed
    pub content: Vec<u8>,
    /// SHA-256 of `content`
    pub digest: String,
    /// Detached signature over `content`
    pub signature: Vec<u8>,
}

/// Builds, signs and publishes feeds
///
/// Rebuilds of one audience are serialized; different audiences proceed
/// independently. Each audience remembers the repository generation it was
/// last published at and refuses to publish an older one over it.
pub struct FeedAggregator {
    config: FeedConfig,
    storage: FileStorage,
    signer: SigningEngine,
    cache: Arc<FileCache>,
    published: parking_lot::Mutex<HashMap<Audience, Arc<Mutex<u64>>>>,
}

impl std::fmt::Debug for FeedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedAggregator")
            .field("dir", &self.storage.base_dir())
            .field("origin", &self.config.origin)
            .finish()
    }
}

impl FeedAggregator {
    /// Create an aggregator writing to `storage`
    pub fn new(config: FeedConfig, storage: FileStorage, signer: SigningEngine, cache: Arc<FileCache>) -> Self {
        Self {
            config,
            storage,
            signer,
            cache,
            published: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Feed configuration
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Feed store
    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Feed file name of `audience`
    pub fn filename(&self, audience: &Audience) -> String {
        feed_filename(&self.config, audience)
    }

    fn audience_lock(&self, audience: &Audience) -> Arc<Mutex<u64>> {
        let mut published = self.published.lock();
        Arc::clone(published.entry(audience.clone()).or_default())
    }

    fn render(&self, state: &RepositoryState, audience: &Audience) -> DepotResult<(String, Vec<u8>, String)> {
        let filename = self.filename(audience);
        let content = render_feed(&self.config, state, audience)?;
        let digest = compute_sha256_hex(&content);
        Ok((filename, content, digest))
    }

    fn is_current(&self, filename: &str, digest: &str) -> bool {
        self.cache.matches(&cache_key(FEEDS_PREFIX, filename), digest)
    }

    /// Render and sign the feed of `audience` as seen in `state`
    ///
    /// The feed is signed even when it matches the published one; whether it
    /// is written is decided by [`publish`](Self::publish).
    pub async fn stage(&self, state: &RepositoryState, audience: &Audience) -> DepotResult<StagedFeed> {
        let (filename, content, digest) = self.render(state, audience)?;
        let signature = self.signer.sign(content.clone()).await?;
        debug!(audience = %audience, filename = %filename, bytes = content.len(), "Feed staged");
        Ok(StagedFeed {
            audience: audience.clone(),
            filename,
            content,
            digest,
            signature,
        })
    }

    /// Render and sign every audience in `audiences`
    pub async fn stage_all(&self, state: &RepositoryState, audiences: &[Audience]) -> DepotResult<Vec<StagedFeed>> {
        let mut staged = Vec::with_capacity(audiences.len());
        for audience in audiences {
            staged.push(self.stage(state, audience).await?);
        }
        Ok(staged)
    }

    /// Write staged feeds rendered at repository `generation`
    ///
    /// A feed is skipped when its audience was already published at a later
    /// generation. A feed whose content is already published is not rewritten
    /// but still records `generation`, so an older staged feed cannot replace
    /// it afterwards. Returns the file names written.
    pub async fn publish(&self, staged: Vec<StagedFeed>, generation: u64) -> DepotResult<Vec<String>> {
        let mut written = Vec::new();
        for feed in staged {
            let lock = self.audience_lock(&feed.audience);
            let mut published = lock.lock().await;
            if *published > generation {
                debug!(
                    audience = %feed.audience,
                    published = *published,
                    generation,
                    "Skipping stale feed"
                );
                continue;
            }
            if self.is_current(&feed.filename, &feed.digest) {
                debug!(audience = %feed.audience, filename = %feed.filename, "Feed unchanged");
            } else {
                written.extend(self.write_feed(&feed).await?);
            }
            *published = generation;
        }
        Ok(written)
    }

    async fn write_feed(&self, feed: &StagedFeed) -> DepotResult<[String; 2]> {
        let signature_filename = signature_name(&feed.filename);
        self.storage.write_atomic(&feed.filename, &feed.content).await?;
        self.storage.write_atomic(&signature_filename, &feed.signature).await?;

        self.cache.put(cache_key(FEEDS_PREFIX, &feed.filename), &feed.content);
        self.cache.put(cache_key(FEEDS_PREFIX, &signature_filename), &feed.signature);

        info!(
            audience = %feed.audience,
            filename = %feed.filename,
            bytes = feed.content.len(),
            "Feed published"
        );
        Ok([feed.filename.clone(), signature_filename])
    }

    /// Regenerate the feed of `audience` from `state`
    ///
    /// Returns the file names actually written; empty when unchanged.
    pub async fn rebuild(&self, state: &RepositoryState, audience: &Audience) -> DepotResult<Vec<String>> {
        let lock = self.audience_lock(audience);
        let mut published = lock.lock().await;
        if *published > state.generation {
            debug!(audience = %audience, "Feed already newer than requested state");
            return Ok(Vec::new());
        }

        let (filename, content, digest) = self.render(state, audience)?;
        if self.is_current(&filename, &digest) {
            debug!(audience = %audience, filename = %filename, "Feed unchanged");
            *published = state.generation;
            return Ok(Vec::new());
        }

        let signature = self.signer.sign(content.clone()).await?;
        let feed = StagedFeed {
            audience: audience.clone(),
            filename,
            content,
            digest,
            signature,
        };
        let written = self.write_feed(&feed).await?;
        *published = state.generation;
        Ok(written.into())
    }

    /// Read and verify a published feed, returning its XML and signer
    pub async fn verify(&self, filename: &str) -> DepotResult<(String, SignatureInfo)> {
        let content = self
            .storage
            .read_optional(filename)
            .await?
            .ok_or_else(|| DepotError::NotFound(format!("No feed named {filename}")))?;
        let signature_filename = signature_name(filename);
        let signature = self
            .storage
            .read_optional(&signature_filename)
            .await?
            .ok_or_else(|| DepotError::Trust(format!("{filename} has no detached signature")))?;

        let info = self.signer.verify(content.clone(), signature).await?;
        let xml = decompress(&content).map_err(|e| DepotError::Corruption(format!("{filename}: {e}")))?;
        Ok((xml, info))
    }
}

/// Audiences to regenerate for `groups`: one per distinct group, then the
/// global audiences
pub fn audiences_for<'a>(groups: impl IntoIterator<Item = &'a str>) -> Vec<Audience> {
    let mut groups: Vec<&str> = groups.into_iter().collect();
    groups.sort_unstable();
    groups.dedup();

    groups
        .into_iter()
        .map(|g| Audience::Group(g.to_string()))
        .chain(Audience::GLOBAL)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use fwdepot_repository::{FirmwareRepository, PackageId, Target};
    use tempfile::TempDir;

    fn component(component_id: &str, device_guid: &str, version: &str) -> ComponentRecord {
        ComponentRecord {
            component_id: component_id.to_string(),
            device_guid: device_guid.to_string(),
            name: "Widget & Co".to_string(),
            summary: "Firmware for the widget".to_string(),
            description: Some("<p>Widget firmware</p>".to_string()),
            developer_name: "ACME".to_string(),
            metadata_license: "CC0-1.0".to_string(),
            project_license: "proprietary".to_string(),
            homepage: Some("https://acme.invalid/".to_string()),
            version: version.to_string(),
            release_description: Some("<p>Fixes</p>".to_string()),
            release_timestamp: Some(1_577_836_800),
            installed_size: 4,
            download_size: 1024,
            content_checksum: "a".repeat(64),
            content_filename: "firmware.bin".to_string(),
            container_checksum: "b".repeat(64),
        }
    }

    fn package(seed: &str, group: &str, target: Target, age_days: i64, components: Vec<ComponentRecord>) -> FirmwarePackage {
        let package_id = PackageId::from_content(seed.as_bytes());
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
        FirmwarePackage {
            stored_filename: FirmwarePackage::stored_filename_for(&package_id, "firmware.cab"),
            package_id,
            origin_address: None,
            submitted_at: base.checked_sub_signed(Duration::days(age_days)).unwrap_or(base),
            owning_group: group.to_string(),
            target,
            display_version: None,
            components,
        }
    }

    async fn state_with(packages: Vec<FirmwarePackage>) -> Result<(Arc<RepositoryState>, TempDir), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let repo = FirmwareRepository::open(temp_dir.path()).await?;
        let mut txn = repo.begin().await;
        for package in packages {
            txn.insert(package)?;
        }
        txn.commit().await?;
        Ok((repo.snapshot(), temp_dir))
    }

    #[tokio::test]
    async fn test_select_latest_per_guid() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _temp_dir) = state_with(vec![
            package("old", "acme", Target::Stable, 10, vec![component("com.acme.a", "g1", "1.0")]),
            package("new", "acme", Target::Stable, 1, vec![component("com.acme.a", "g1", "1.1")]),
            package("private", "acme", Target::Private, 0, vec![component("com.acme.a", "g1", "2.0")]),
            package("other", "other", Target::Testing, 5, vec![component("com.other.b", "g0", "3.0")]),
        ])
        .await?;

        let latest = select_latest(&state, &Audience::StableAndTesting);
        let versions: Vec<_> = latest.iter().map(|(guid, e)| (*guid, e.component.version.as_str())).collect();
        assert_eq!(versions, [("g0", "3.0"), ("g1", "1.1")]);

        let group = select_latest(&state, &Audience::Group("acme".into()));
        assert_eq!(group.len(), 1);
        assert!(select_latest(&state, &Audience::Testing).contains_key("g0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_tie_breaks_on_package_id() -> Result<(), Box<dyn std::error::Error>> {
        let a = package("tie-a", "acme", Target::Stable, 3, vec![component("com.acme.a", "g1", "1.0")]);
        let b = package("tie-b", "acme", Target::Stable, 3, vec![component("com.acme.a", "g1", "1.1")]);
        let expected = std::cmp::max(a.package_id.clone(), b.package_id.clone());
        let (state, _temp_dir) = state_with(vec![a, b]).await?;

        let latest = select_latest(&state, &Audience::StableAndTesting);
        assert_eq!(latest.get("g1").map(|e| &e.package.package_id), Some(&expected));
        Ok(())
    }

    #[tokio::test]
    async fn test_rendered_document_shape() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _temp_dir) = state_with(vec![package(
            "one",
            "acme",
            Target::Stable,
            0,
            vec![component("com.acme.a", "g1", "1.2.3")],
        )])
        .await?;
        let config = FeedConfig::default();

        let xml = decompress(&render_feed(&config, &state, &Audience::StableAndTesting)?)?;
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<components origin=\"fwdepot\" version=\"0.9\">"));
        assert!(xml.contains("<name>Widget &amp; Co</name>"));
        assert!(xml.contains("<description><p>Widget firmware</p></description>"));
        assert!(xml.contains("<firmware type=\"flashed\">g1</firmware>"));
        assert!(xml.contains("<release version=\"1.2.3\" timestamp=\"1577836800\">"));
        assert!(xml.contains("https://fwdepot.invalid/downloads/"));
        assert!(xml.contains("target=\"content\" type=\"sha256\">aaaa"));
        assert!(xml.contains("<size type=\"download\">1024</size>"));
        Ok(())
    }

    #[tokio::test]
    async fn test_render_is_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
        let (state, _temp_dir) = state_with(vec![
            package("one", "acme", Target::Stable, 0, vec![component("com.acme.a", "g2", "1")]),
            package("two", "acme", Target::Testing, 1, vec![component("com.acme.b", "g1", "1")]),
        ])
        .await?;
        let config = FeedConfig::default();

        for audience in audiences_for(state.packages().map(|p| p.owning_group.as_str())) {
            assert_eq!(
                render_feed(&config, &state, &audience)?,
                render_feed(&config, &state, &audience)?
            );
        }
        Ok(())
    }

    #[test]
    fn test_feed_filenames() {
        let config = FeedConfig::default();
        let name = feed_filename(&config, &Audience::Group("acme".into()));
        assert!(name.starts_with("firmware-"));
        assert!(name.ends_with(FEED_SUFFIX));
        assert!(!name.contains("acme"));
        assert_eq!(name.len(), "firmware-".len() + 64 + FEED_SUFFIX.len());

        assert_eq!(feed_filename(&config, &Audience::StableAndTesting), "firmware.xml.gz");
        assert_eq!(feed_filename(&config, &Audience::Testing), "firmware-testing.xml.gz");
    }
}
