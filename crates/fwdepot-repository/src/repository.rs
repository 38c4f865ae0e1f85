//! Transactional firmware repository
//!
//! Readers work on an immutable [`RepositoryState`] snapshot and never wait for
//! writers. Writers go through a [`Transaction`]: one at a time, each works on
//! a private copy of the state, checks the uniqueness invariants against it,
//! and on commit persists the copy atomically before publishing it as the new
//! snapshot. Dropping a transaction discards its changes.

use crate::error::{RepositoryError, RepositoryResult};
use crate::model::{FirmwarePackage, PackageFilter, PackageId, Target};
use crate::storage::FileStorage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Persisted state file name
pub const STATE_FILE: &str = "repository.json";

/// Layout version of [`STATE_FILE`]
pub const SCHEMA_VERSION: u32 = 1;

/// Complete repository contents at one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Layout version
    pub schema_version: u32,
    /// Incremented by every commit
    pub generation: u64,
    packages: BTreeMap<PackageId, FirmwarePackage>,
}

impl Default for RepositoryState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generation: 0,
            packages: BTreeMap::new(),
        }
    }
}

impl RepositoryState {
    /// Look up a package
    pub fn get(&self, id: &PackageId) -> Option<&FirmwarePackage> {
        self.packages.get(id)
    }

    /// Whether a package exists
    pub fn contains(&self, id: &PackageId) -> bool {
        self.packages.contains_key(id)
    }

    /// All packages in identifier order
    pub fn packages(&self) -> impl Iterator<Item = &FirmwarePackage> {
        self.packages.values()
    }

    /// Packages selected by `filter`, newest submission first
    pub fn list(&self, filter: &PackageFilter) -> Vec<&FirmwarePackage> {
        let mut packages: Vec<_> = self.packages.values().filter(|p| filter.matches(p)).collect();
        packages.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.package_id.cmp(&a.package_id))
        });
        packages
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the repository is empty
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Check that `package` could be inserted
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateIdentity`],
    /// [`RepositoryError::DuplicateDeviceVersion`] or
    /// [`RepositoryError::IdentifierReassigned`] when an invariant would break,
    /// [`RepositoryError::EmptyPackage`] when the package has no components.
    pub fn check_insert(&self, package: &FirmwarePackage) -> RepositoryResult<()> {
        if self.contains(&package.package_id) {
            return Err(RepositoryError::DuplicateIdentity(package.package_id.to_string()));
        }
        if package.components.is_empty() {
            return Err(RepositoryError::EmptyPackage(package.package_id.to_string()));
        }

        for (index, component) in package.components.iter().enumerate() {
            let earlier = package.components.iter().take(index);
            for (other_id, other) in self
                .packages
                .values()
                .flat_map(|p| p.components.iter().map(move |c| (&p.package_id, c)))
                .chain(earlier.map(|c| (&package.package_id, c)))
            {
                if other.device_guid == component.device_guid && other.version == component.version {
                    return Err(RepositoryError::DuplicateDeviceVersion {
                        device_guid: component.device_guid.clone(),
                        version: component.version.clone(),
                        existing: other_id.to_string(),
                    });
                }
                if other.component_id == component.component_id
                    && other.device_guid != component.device_guid
                {
                    return Err(RepositoryError::IdentifierReassigned {
                        component_id: component.component_id.clone(),
                        device_guid: component.device_guid.clone(),
                        existing_guid: other.device_guid.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Firmware repository persisted as a single JSON state file
pub struct FirmwareRepository {
    storage: FileStorage,
    snapshot: RwLock<Arc<RepositoryState>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for FirmwareRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("FirmwareRepository")
            .field("dir", &self.storage.base_dir())
            .field("generation", &snapshot.generation)
            .field("packages", &snapshot.len())
            .finish()
    }
}

impl FirmwareRepository {
    /// Open the repository stored in `dir`, creating an empty one if absent
    pub async fn open(dir: &Path) -> RepositoryResult<Self> {
        let storage = FileStorage::new(dir).await?;

        let state = match storage.read_optional(STATE_FILE).await? {
            Some(bytes) => {
                let state: RepositoryState = serde_json::from_slice(&bytes)?;
                if state.schema_version != SCHEMA_VERSION {
                    return Err(RepositoryError::UnsupportedSchema(state.schema_version));
                }
                state
            }
            None => RepositoryState::default(),
        };

        info!(
            dir = %dir.display(),
            generation = state.generation,
            packages = state.len(),
            "Opened firmware repository"
        );

        Ok(Self {
            storage,
            snapshot: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        })
    }

    /// Current committed state
    pub fn snapshot(&self) -> Arc<RepositoryState> {
        Arc::clone(&self.snapshot.read())
    }

    /// Committed generation
    pub fn generation(&self) -> u64 {
        self.snapshot.read().generation
    }

    /// Look up a package
    pub fn get(&self, id: &PackageId) -> Option<FirmwarePackage> {
        self.snapshot().get(id).cloned()
    }

    /// Packages selected by `filter`, newest submission first
    pub fn list(&self, filter: &PackageFilter) -> Vec<FirmwarePackage> {
        self.snapshot().list(filter).into_iter().cloned().collect()
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the repository is empty
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Start a write transaction, waiting for any other writer to finish
    pub async fn begin(&self) -> Transaction<'_> {
        let guard = self.writer.lock().await;
        let working = RepositoryState::clone(&self.snapshot());
        Transaction {
            repository: self,
            _guard: guard,
            working,
            changes: 0,
            finished: false,
        }
    }

    /// Insert a package in its own transaction
    pub async fn insert(&self, package: FirmwarePackage) -> RepositoryResult<u64> {
        let mut txn = self.begin().await;
        txn.insert(package)?;
        txn.commit().await
    }

    /// Remove a package in its own transaction
    pub async fn delete(&self, id: &PackageId) -> RepositoryResult<FirmwarePackage> {
        let mut txn = self.begin().await;
        let removed = txn.remove(id)?;
        txn.commit().await?;
        Ok(removed)
    }

    /// Change a package's target in its own transaction, returning the old one
    pub async fn set_target(&self, id: &PackageId, target: Target) -> RepositoryResult<Target> {
        let mut txn = self.begin().await;
        let previous = txn.set_target(id, target)?;
        txn.commit().await?;
        Ok(previous)
    }
}

/// Exclusive write access to the repository
///
/// Changes become visible to readers only through [`Transaction::commit`].
pub struct Transaction<'a> {
    repository: &'a FirmwareRepository,
    _guard: MutexGuard<'a, ()>,
    working: RepositoryState,
    changes: usize,
    finished: bool,
}

impl Transaction<'_> {
    /// State including uncommitted changes
    pub fn state(&self) -> &RepositoryState {
        &self.working
    }

    /// Insert a package after checking the uniqueness invariants
    pub fn insert(&mut self, package: FirmwarePackage) -> RepositoryResult<()> {
        self.working.check_insert(&package)?;
        debug!(package_id = %package.package_id, "Staging insert");
        self.working.packages.insert(package.package_id.clone(), package);
        self.changes += 1;
        Ok(())
    }

    /// Remove a package
    pub fn remove(&mut self, id: &PackageId) -> RepositoryResult<FirmwarePackage> {
        let removed = self
            .working
            .packages
            .remove(id)
            .ok_or_else(|| RepositoryError::not_found(id))?;
        self.changes += 1;
        Ok(removed)
    }

    /// Change a package's target, returning the previous one
    pub fn set_target(&mut self, id: &PackageId, target: Target) -> RepositoryResult<Target> {
        let package = self
            .working
            .packages
            .get_mut(id)
            .ok_or_else(|| RepositoryError::not_found(id))?;
        let previous = std::mem::replace(&mut package.target, target);
        self.changes += 1;
        Ok(previous)
    }

    /// Apply `update` to a package's descriptive fields
    ///
    /// Identity, ownership, target and checksum fields must be left as they
    /// were; changing one fails with [`RepositoryError::ImmutableField`] and
    /// leaves the package untouched.
    pub fn update<F>(&mut self, id: &PackageId, update: F) -> RepositoryResult<()>
    where
        F: FnOnce(&mut FirmwarePackage),
    {
        let current = self
            .working
            .packages
            .get(id)
            .ok_or_else(|| RepositoryError::not_found(id))?;

        let mut updated = current.clone();
        update(&mut updated);
        check_immutable(current, &updated)?;

        self.working.packages.insert(id.clone(), updated);
        self.changes += 1;
        Ok(())
    }

    /// Number of staged changes
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Persist and publish the staged state, returning the new generation
    ///
    /// On failure nothing is published and the persisted state is unchanged.
    pub async fn commit(mut self) -> RepositoryResult<u64> {
        self.finished = true;
        let mut state = std::mem::take(&mut self.working);
        state.generation = state.generation.saturating_add(1);

        let json = serde_json::to_vec_pretty(&state)?;
        self.repository.storage.write_atomic(STATE_FILE, &json).await?;

        let generation = state.generation;
        *self.repository.snapshot.write() = Arc::new(state);

        info!(generation, changes = self.changes, "Committed repository transaction");
        Ok(generation)
    }

    /// Discard the staged changes
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(changes = self.changes, "Rolled back repository transaction");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.changes > 0 {
            debug!(changes = self.changes, "Repository transaction dropped without commit");
        }
    }
}

fn check_immutable(before: &FirmwarePackage, after: &FirmwarePackage) -> RepositoryResult<()> {
    let violation = |field: &'static str| RepositoryError::ImmutableField {
        package_id: before.package_id.to_string(),
        field,
    };

    if before.package_id != after.package_id {
        return Err(violation("package_id"));
    }
    if before.stored_filename != after.stored_filename {
        return Err(violation("stored_filename"));
    }
    if before.owning_group != after.owning_group {
        return Err(violation("owning_group"));
    }
    if before.target != after.target {
        return Err(violation("target"));
    }
    if before.submitted_at != after.submitted_at {
        return Err(violation("submitted_at"));
    }
    if before.components.len() != after.components.len() {
        return Err(violation("components"));
    }
    for (old, new) in before.components.iter().zip(&after.components) {
        if old.component_id != new.component_id {
            return Err(violation("component_id"));
        }
        if old.device_guid != new.device_guid {
            return Err(violation("device_guid"));
        }
        if old.version != new.version {
            return Err(violation("version"));
        }
        if old.content_checksum != new.content_checksum || old.content_filename != new.content_filename {
            return Err(violation("content_checksum"));
        }
        if old.container_checksum != new.container_checksum {
            return Err(violation("container_checksum"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::{component, package};
    use tempfile::TempDir;

    async fn create_test_repository() -> RepositoryResult<(FirmwareRepository, TempDir)> {
        let temp_dir = TempDir::new().map_err(anyhow::Error::from)?;
        let repo = FirmwareRepository::open(temp_dir.path()).await?;
        Ok((repo, temp_dir))
    }

    #[tokio::test]
    async fn test_insert_and_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, temp_dir) = create_test_repository().await?;
        let pkg = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        let id = pkg.package_id.clone();

        assert_eq!(repo.insert(pkg.clone()).await?, 1);
        assert_eq!(repo.get(&id), Some(pkg.clone()));
        drop(repo);

        let reopened = FirmwareRepository::open(temp_dir.path()).await?;
        assert_eq!(reopened.generation(), 1);
        assert_eq!(reopened.get(&id), Some(pkg));
        Ok(())
    }

    #[tokio::test]
    async fn test_uniqueness_invariants() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        let first = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        repo.insert(first.clone()).await?;

        let err = repo.insert(first).await.err().ok_or("expected duplicate")?;
        assert!(matches!(err, RepositoryError::DuplicateIdentity(_)));

        let same_pair = package("b", "acme", vec![component("com.acme.b", "g1", "1.0")]);
        let err = repo.insert(same_pair).await.err().ok_or("expected duplicate pair")?;
        assert!(matches!(err, RepositoryError::DuplicateDeviceVersion { .. }));

        let reassigned = package("c", "acme", vec![component("com.acme.a", "g2", "2.0")]);
        let err = repo.insert(reassigned).await.err().ok_or("expected reassignment")?;
        assert!(matches!(err, RepositoryError::IdentifierReassigned { .. }));

        let newer = package("d", "acme", vec![component("com.acme.a", "g1", "1.1")]);
        repo.insert(newer).await?;

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.generation(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicates_within_one_package() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        let pkg = package(
            "a",
            "acme",
            vec![component("com.acme.a", "g1", "1.0"), component("com.acme.b", "g1", "1.0")],
        );
        assert!(matches!(
            repo.insert(pkg).await,
            Err(RepositoryError::DuplicateDeviceVersion { .. })
        ));

        let empty = package("b", "acme", Vec::new());
        assert!(matches!(repo.insert(empty).await, Err(RepositoryError::EmptyPackage(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        {
            let mut txn = repo.begin().await;
            txn.insert(package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]))?;
            assert_eq!(txn.state().len(), 1);
            assert!(repo.is_empty());
        }
        assert!(repo.is_empty());
        assert_eq!(repo.generation(), 0);

        let mut txn = repo.begin().await;
        txn.insert(package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]))?;
        txn.rollback();
        assert!(repo.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_set_target_and_delete() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        let pkg = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        let id = pkg.package_id.clone();
        repo.insert(pkg).await?;

        assert_eq!(repo.set_target(&id, Target::Stable).await?, Target::Private);
        assert_eq!(repo.get(&id).map(|p| p.target), Some(Target::Stable));

        let removed = repo.delete(&id).await?;
        assert_eq!(removed.target, Target::Stable);
        assert!(matches!(repo.delete(&id).await, Err(RepositoryError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_rejects_identity_changes() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        let pkg = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        let id = pkg.package_id.clone();
        repo.insert(pkg).await?;

        let mut txn = repo.begin().await;
        txn.update(&id, |p| {
            p.display_version = Some("1.0.0".into());
            for c in &mut p.components {
                c.installed_size = 99;
            }
        })?;
        let err = txn
            .update(&id, |p| {
                for c in &mut p.components {
                    c.content_checksum = "0".repeat(64);
                }
            })
            .err()
            .ok_or("expected immutable field error")?;
        assert!(matches!(
            err,
            RepositoryError::ImmutableField {
                field: "content_checksum",
                ..
            }
        ));
        txn.commit().await?;

        let stored = repo.get(&id).ok_or("missing")?;
        assert_eq!(stored.display_version.as_deref(), Some("1.0.0"));
        assert_eq!(stored.components.first().map(|c| c.installed_size), Some(99));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_order_and_filter() -> Result<(), Box<dyn std::error::Error>> {
        let (repo, _temp_dir) = create_test_repository().await?;
        let mut older = package("a", "acme", vec![component("com.acme.a", "g1", "1.0")]);
        older.submitted_at = chrono::DateTime::from_timestamp(1_000, 0).ok_or("timestamp")?;
        let newer = package("b", "other", vec![component("com.other.b", "g2", "1.0")]);
        repo.insert(older.clone()).await?;
        repo.insert(newer.clone()).await?;

        let all: Vec<_> = repo.list(&PackageFilter::all()).into_iter().map(|p| p.package_id).collect();
        assert_eq!(all, vec![newer.package_id, older.package_id.clone()]);

        let acme = repo.list(&PackageFilter::all().with_group("acme"));
        assert_eq!(acme.len(), 1);
        assert_eq!(acme.first().map(|p| &p.package_id), Some(&older.package_id));
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_schema() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        std::fs::write(
            temp_dir.path().join(STATE_FILE),
            br#"{"schema_version": 99, "generation": 0, "packages": {}}"#,
        )?;
        assert!(matches!(
            FirmwareRepository::open(temp_dir.path()).await,
            Err(RepositoryError::UnsupportedSchema(99))
        ));
        Ok(())
    }
}
