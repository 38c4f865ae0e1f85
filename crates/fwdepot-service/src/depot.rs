//! Firmware depot facade
//!
//! The entry point used by the web layer and the command-line tool. Every
//! call carries the caller's [`ActorCapabilities`]; nothing here reads
//! ambient session state.
//!
//! Write paths follow one sequence: validate and sign outside the repository
//! lock, then inside one transaction insert or change the package, render and
//! sign the affected feeds, and write artifacts before committing. Feeds are
//! published after the commit, then the checkpoint is taken. A crash or failure
//! after the commit leaves the checkpoint behind the repository generation,
//! which is detected and repaired on the next open.

use crate::audit::{AuditEvent, AuditKind, AuditSink, TracingAuditSink};
use crate::cache::{DOWNLOADS_PREFIX, FEEDS_PREFIX, FileCache, cache_key};
use crate::checkpoint::{Checkpointer, FileCheckpointer, is_lagging};
use crate::config::DepotConfig;
use crate::error::{DepotError, DepotResult};
use crate::feed::{FeedAggregator, StagedFeed, audiences_for, select_latest_where};
use crate::ingest::{IngestPipeline, UploadRequest};
use crate::signing::SigningEngine;
use chrono::Utc;
use fwdepot_crypto::{Keyring, SignatureInfo};
use fwdepot_repository::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Package as shown to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageView {
    /// Filename the vendor uploaded
    pub original_filename: String,
    /// Published path of the distribution archive
    pub download_path: String,
    /// Feed of the owning group
    pub group_feed: String,
    /// The stored record
    #[serde(flatten)]
    pub package: FirmwarePackage,
}

/// One device in the public device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    /// Device name
    pub name: String,
    /// Device GUID
    pub device_guid: String,
    /// Version shown to users
    pub version: String,
    /// Distribution archive name
    pub filename: String,
}

/// Devices of one vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceGroup {
    /// Developer name
    pub developer_name: String,
    /// Devices sorted by name
    pub devices: Vec<DeviceEntry>,
}

/// Ingestion, promotion, deletion and feed maintenance
pub struct FirmwareDepot {
    config: DepotConfig,
    repository: FirmwareRepository,
    uploads: FileStorage,
    downloads: FileStorage,
    cache: Arc<FileCache>,
    feeds: FeedAggregator,
    pipeline: IngestPipeline,
    signer: SigningEngine,
    policy: PromotionPolicy,
    checkpointer: Arc<dyn Checkpointer>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for FirmwareDepot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareDepot")
            .field("root", &self.config.storage.root)
            .field("repository", &self.repository)
            .field("identity", &self.signer.identity())
            .finish()
    }
}

impl FirmwareDepot {
    /// Open the depot described by `config`
    ///
    /// Loads the keyring from disk and checkpoints to a file.
    pub async fn open(config: DepotConfig) -> DepotResult<Self> {
        config.validate()?;
        let keyring = Keyring::open(config.keyring_path())?;
        let checkpointer = FileCheckpointer::new(&config.storage.checkpoint_path()).await?;
        Self::open_with(config, keyring, Arc::new(checkpointer), Arc::new(TracingAuditSink)).await
    }

    /// Open with explicit collaborators
    pub async fn open_with(
        config: DepotConfig,
        keyring: Keyring,
        checkpointer: Arc<dyn Checkpointer>,
        audit: Arc<dyn AuditSink>,
    ) -> DepotResult<Self> {
        config.validate()?;

        let repository = FirmwareRepository::open(&config.storage.db_path()).await?;
        let uploads = FileStorage::new(&config.storage.uploads_path()).await?;
        let downloads = FileStorage::new(&config.storage.downloads_path()).await?;
        let feed_storage = FileStorage::new(&config.storage.feeds_path()).await?;

        let signer = SigningEngine::new(keyring, config.signing.identity.clone(), config.signing.timeout());
        let cache = Arc::new(FileCache::new());
        cache
            .rebuild(&[(DOWNLOADS_PREFIX, &downloads), (FEEDS_PREFIX, &feed_storage)])
            .await?;

        let feeds = FeedAggregator::new(config.feed.clone(), feed_storage, signer.clone(), Arc::clone(&cache));
        let pipeline = IngestPipeline::new(config.ingest.clone(), signer.clone());

        let depot = Self {
            config,
            repository,
            uploads,
            downloads,
            cache,
            feeds,
            pipeline,
            signer,
            policy: PromotionPolicy::new(),
            checkpointer,
            audit,
        };
        depot.recover().await?;

        info!(
            root = %depot.config.storage.root.display(),
            packages = depot.repository.len(),
            generation = depot.repository.generation(),
            "Firmware depot opened"
        );
        Ok(depot)
    }

    /// Bring feeds and checkpoint up to the repository generation
    async fn recover(&self) -> DepotResult<()> {
        let state = self.repository.snapshot();
        let checkpointed = self.checkpointer.last_generation().await?;
        if !is_lagging(checkpointed, state.generation) {
            return Ok(());
        }

        if let Err(e) = self.signer.ensure_ready() {
            warn!(
                error = %e,
                checkpoint = ?checkpointed,
                repository = state.generation,
                "Checkpoint lags repository but feeds cannot be signed, deferring repair"
            );
            return Ok(());
        }

        warn!(
            checkpoint = ?checkpointed,
            repository = state.generation,
            "Checkpoint lags repository, regenerating feeds"
        );
        let audiences = audiences_for(state.packages().map(|p| p.owning_group.as_str()));
        for audience in &audiences {
            self.feeds.rebuild(&state, audience).await?;
        }
        self.checkpointer.checkpoint(&state).await?;
        Ok(())
    }

    /// Configuration in use
    pub fn config(&self) -> &DepotConfig {
        &self.config
    }

    /// Underlying repository
    pub fn repository(&self) -> &FirmwareRepository {
        &self.repository
    }

    /// Read cache over published files
    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Feed aggregator
    pub fn feeds(&self) -> &FeedAggregator {
        &self.feeds
    }

    fn deny(&self, err: PermissionError, package_id: Option<&PackageId>, group: &str) -> DepotError {
        let mut event = AuditEvent::new(AuditKind::PermissionDenied, err.to_string()).with_group(group);
        if let Some(id) = package_id {
            event = event.with_package(id);
        }
        self.audit.record(event);
        DepotError::PermissionDenied(err)
    }

    fn require_package(&self, id: &PackageId) -> DepotResult<FirmwarePackage> {
        self.repository
            .get(id)
            .ok_or_else(|| DepotError::NotFound(format!("No firmware with ID {id} exists")))
    }

    fn view(&self, package: FirmwarePackage) -> PackageView {
        PackageView {
            original_filename: package.original_filename().to_string(),
            download_path: cache_key(DOWNLOADS_PREFIX, &package.stored_filename),
            group_feed: self.feeds.filename(&Audience::Group(package.owning_group.clone())),
            package,
        }
    }

    /// Publish staged feeds and checkpoint after a commit at `generation`
    ///
    /// Failures are logged and left for the repair on next open; the commit
    /// already happened.
    async fn after_commit(&self, staged: Vec<StagedFeed>, generation: u64) -> Vec<String> {
        let written = match self.feeds.publish(staged, generation).await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, generation, "Feed publication failed, repair deferred to next open");
                return Vec::new();
            }
        };

        let state = self.repository.snapshot();
        if let Err(e) = self.checkpointer.checkpoint(&state).await {
            warn!(error = %e, generation = state.generation, "Checkpoint failed, repair deferred to next open");
        }
        written
    }

    /// Validate, sign and store an upload
    ///
    /// # Errors
    ///
    /// Validation, archive, trust and uniqueness failures leave the depot
    /// unchanged.
    pub async fn ingest(&self, request: UploadRequest, actor: &ActorCapabilities) -> DepotResult<PackageId> {
        self.policy
            .authorize_upload(actor, &request.group, request.target)
            .map_err(|e| self.deny(e, None, &request.group))?;
        self.signer.ensure_ready()?;
        self.pipeline.check_size(request.data.len())?;

        let package_id = PackageId::from_content(&request.data);
        if self.repository.snapshot().contains(&package_id) {
            return Err(DepotError::from(RepositoryError::DuplicateIdentity(package_id.to_string())));
        }

        let prepared = match self.pipeline.prepare(&request, Utc::now()).await {
            Ok(prepared) => prepared,
            Err(DepotError::Trust(reason)) => {
                self.audit.record(
                    AuditEvent::new(AuditKind::TrustFailure, format!("{}: {reason}", request.filename))
                        .with_group(&request.group),
                );
                return Err(DepotError::Trust(reason));
            }
            Err(e) => return Err(e),
        };

        let package = prepared.package.clone();
        let stored = package.stored_filename.clone();

        let mut txn = self.repository.begin().await;
        txn.insert(prepared.package)?;
        let audiences = Audience::affected(&package.owning_group, None, Some(package.target));
        let staged = self.feeds.stage_all(txn.state(), &audiences).await?;

        self.uploads.write_atomic(&stored, &prepared.upload).await?;
        if let Err(e) = self.downloads.write_atomic(&stored, &prepared.distribution).await {
            self.remove_artifacts(&stored).await;
            return Err(e.into());
        }
        let generation = match txn.commit().await {
            Ok(generation) => generation,
            Err(e) => {
                self.remove_artifacts(&stored).await;
                return Err(e.into());
            }
        };

        self.cache.put(cache_key(DOWNLOADS_PREFIX, &stored), &prepared.distribution);
        self.after_commit(staged, generation).await;

        self.audit.record(
            AuditEvent::new(
                AuditKind::Uploaded,
                format!("Uploaded file {} to {}", package.original_filename(), package.target),
            )
            .with_package(&package_id)
            .with_group(&package.owning_group),
        );
        info!(package_id = %package_id, target = %package.target, generation, "Firmware ingested");
        Ok(package_id)
    }

    async fn remove_artifacts(&self, stored: &str) {
        for (label, storage) in [("uploads", &self.uploads), ("downloads", &self.downloads)] {
            if let Err(e) = storage.delete(stored).await {
                warn!(store = label, file = stored, error = %e, "Failed to remove artifact");
            }
        }
    }

    /// Move a package to `target`, returning the previous target
    pub async fn promote(&self, id: &PackageId, target: Target, actor: &ActorCapabilities) -> DepotResult<Target> {
        let package = self.require_package(id)?;
        self.policy
            .authorize_transition(actor, &package.owning_group, target)
            .map_err(|e| self.deny(e, Some(id), &package.owning_group))?;
        self.signer.ensure_ready()?;

        let mut txn = self.repository.begin().await;
        let previous = txn.set_target(id, target)?;
        if previous == target {
            txn.rollback();
            debug!(package_id = %id, target = %target, "Target unchanged");
            return Ok(previous);
        }

        let audiences = Audience::affected(&package.owning_group, Some(previous), Some(target));
        let staged = self.feeds.stage_all(txn.state(), &audiences).await?;
        let generation = txn.commit().await?;
        self.after_commit(staged, generation).await;

        self.audit.record(
            AuditEvent::new(AuditKind::Promoted, format!("Moved firmware from {previous} to {target}"))
                .with_package(id)
                .with_group(&package.owning_group),
        );
        info!(package_id = %id, from = %previous, to = %target, generation, "Firmware promoted");
        Ok(previous)
    }

    /// Remove a package, its artifacts and its feed entries
    pub async fn delete(&self, id: &PackageId, actor: &ActorCapabilities) -> DepotResult<()> {
        let package = self.require_package(id)?;
        self.policy
            .authorize_delete(actor, &package.owning_group, package.target)
            .map_err(|e| self.deny(e, Some(id), &package.owning_group))?;
        self.signer.ensure_ready()?;

        let mut txn = self.repository.begin().await;
        let removed = txn.remove(id)?;
        let audiences = Audience::affected(&removed.owning_group, Some(removed.target), None);
        let staged = self.feeds.stage_all(txn.state(), &audiences).await?;
        let generation = txn.commit().await?;

        self.remove_artifacts(&removed.stored_filename).await;
        self.cache.evict(&cache_key(DOWNLOADS_PREFIX, &removed.stored_filename));
        self.after_commit(staged, generation).await;

        self.audit.record(
            AuditEvent::new(AuditKind::Deleted, format!("Deleted firmware {}", removed.original_filename()))
                .with_package(id)
                .with_group(&removed.owning_group),
        );
        info!(package_id = %id, generation, "Firmware deleted");
        Ok(())
    }

    /// Regenerate every feed that packages selected by `filter` appear in
    ///
    /// Returns the feed and signature file names actually written.
    pub async fn rebuild_all(&self, filter: &PackageFilter, actor: &ActorCapabilities) -> DepotResult<Vec<String>> {
        self.policy
            .authorize_admin(actor, "rebuild feeds")
            .map_err(|e| self.deny(e, None, filter.group.as_deref().unwrap_or_default()))?;
        self.signer.ensure_ready()?;

        let state = self.repository.snapshot();
        let audiences = audiences_for(
            state
                .list(filter)
                .into_iter()
                .map(|p| p.owning_group.as_str())
                .chain(filter.group.as_deref()),
        );

        let mut written = Vec::new();
        for audience in &audiences {
            written.extend(self.feeds.rebuild(&state, audience).await?);
        }

        self.audit.record(AuditEvent::new(
            AuditKind::FeedsRebuilt,
            format!("Rebuilt {} feeds, {} files written", audiences.len(), written.len()),
        ));
        Ok(written)
    }

    /// Look up one package
    pub async fn get_package(&self, id: &PackageId, actor: &ActorCapabilities) -> DepotResult<PackageView> {
        let package = self.require_package(id)?;
        self.policy
            .authorize_view(actor, &package.owning_group)
            .map_err(|e| self.deny(e, Some(id), &package.owning_group))?;
        Ok(self.view(package))
    }

    /// Packages selected by `filter`, newest first
    ///
    /// Non-administrators only see their own group.
    pub async fn list_packages(&self, filter: &PackageFilter, actor: &ActorCapabilities) -> DepotResult<Vec<PackageView>> {
        let mut filter = filter.clone();
        if !actor.admin {
            let group = filter
                .group
                .clone()
                .or_else(|| actor.group.clone())
                .unwrap_or_default();
            self.policy
                .authorize_view(actor, &group)
                .map_err(|e| self.deny(e, None, &group))?;
            filter.group = Some(group);
        }

        Ok(self
            .repository
            .list(&filter)
            .into_iter()
            .map(|p| self.view(p))
            .collect())
    }

    /// Re-derive descriptive metadata from the stored originals
    ///
    /// Sizes, descriptions and the display version are recomputed; identity
    /// and checksum fields are never touched. Returns the number of packages
    /// refreshed.
    pub async fn refresh_metadata(&self, filter: &PackageFilter, actor: &ActorCapabilities) -> DepotResult<usize> {
        self.policy
            .authorize_admin(actor, "refresh metadata")
            .map_err(|e| self.deny(e, None, filter.group.as_deref().unwrap_or_default()))?;
        self.signer.ensure_ready()?;

        let mut txn = self.repository.begin().await;
        let selected: Vec<FirmwarePackage> = txn.state().list(filter).into_iter().cloned().collect();
        let mut groups = Vec::new();
        let mut refreshed = 0usize;

        for package in &selected {
            let Some(upload) = self.uploads.read_optional(&package.stored_filename).await? else {
                warn!(package_id = %package.package_id, "Original upload missing, skipping refresh");
                continue;
            };
            let metadata = match self.pipeline.read_archive(&upload).await {
                Ok(archive) => self.pipeline.describe(&archive),
                Err(e) => Err(e),
            };
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(package_id = %package.package_id, error = %e, "Stored upload no longer validates");
                    continue;
                }
            };

            let download_size = upload.len() as u64;
            txn.update(&package.package_id, |p| {
                p.display_version = metadata.display_version();
                for record in &mut p.components {
                    let Some(described) = metadata
                        .components
                        .iter()
                        .find(|d| d.component.id == record.component_id)
                    else {
                        continue;
                    };
                    record.installed_size = described.payload.len() as u64;
                    record.download_size = download_size;
                    record.description = described.component.description.clone();
                    record.release_description = described.component.release().and_then(|r| r.description.clone());
                }
            })?;
            groups.push(package.owning_group.as_str());
            refreshed += 1;
        }

        if refreshed == 0 {
            txn.rollback();
            return Ok(0);
        }

        let audiences = audiences_for(groups);
        let staged = self.feeds.stage_all(txn.state(), &audiences).await?;
        let generation = txn.commit().await?;
        self.after_commit(staged, generation).await;

        self.audit.record(AuditEvent::new(
            AuditKind::MetadataRefreshed,
            format!("Refreshed metadata of {refreshed} packages"),
        ));
        Ok(refreshed)
    }

    /// Re-derive the read cache from the distribution and feed stores
    pub async fn rebuild_cache(&self, actor: &ActorCapabilities) -> DepotResult<usize> {
        self.policy
            .authorize_admin(actor, "rebuild cache")
            .map_err(|e| self.deny(e, None, ""))?;
        let count = self
            .cache
            .rebuild(&[(DOWNLOADS_PREFIX, &self.downloads), (FEEDS_PREFIX, self.feeds.storage())])
            .await?;
        Ok(count)
    }

    /// Newest stable firmware per device, grouped by developer name
    pub fn device_list(&self) -> Vec<DeviceGroup> {
        let state = self.repository.snapshot();
        let mut groups: BTreeMap<&str, Vec<DeviceEntry>> = BTreeMap::new();

        for (guid, entry) in select_latest_where(&state, |p| p.target == Target::Stable) {
            let version = entry
                .package
                .display_version
                .as_deref()
                .unwrap_or(&entry.component.version);
            groups
                .entry(entry.component.developer_name.as_str())
                .or_default()
                .push(DeviceEntry {
                    name: entry.component.name.clone(),
                    device_guid: guid.to_string(),
                    version: version.to_string(),
                    filename: entry.package.stored_filename.clone(),
                });
        }

        groups
            .into_iter()
            .map(|(developer_name, mut devices)| {
                devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.device_guid.cmp(&b.device_guid)));
                DeviceGroup {
                    developer_name: developer_name.to_string(),
                    devices,
                }
            })
            .collect()
    }

    /// Read a published feed and verify its signature
    pub async fn verify_feed(&self, filename: &str) -> DepotResult<(String, SignatureInfo)> {
        self.feeds.verify(filename).await
    }
}
