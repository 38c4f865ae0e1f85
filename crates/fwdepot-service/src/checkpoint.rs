//! Checkpoint coordinator
//!
//! The repository generation is the durable record of what has been
//! committed. A checkpoint stores a snapshot together with the generation it
//! was taken at; one lagging behind the repository is re-derived at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fwdepot_repository::{FileStorage, RepositoryState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Checkpoint file name
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Snapshots durable state after each mutation
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Snapshot `state`
    async fn checkpoint(&self, state: &RepositoryState) -> anyhow::Result<()>;

    /// Generation of the latest checkpoint, `None` when none was taken
    async fn last_generation(&self) -> anyhow::Result<Option<u64>>;
}

/// On-disk checkpoint record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Repository generation captured
    pub generation: u64,
    /// When the checkpoint was written
    pub taken_at: DateTime<Utc>,
    /// Captured state
    pub state: RepositoryState,
}

/// Writes the snapshot to a JSON file with atomic replacement
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    storage: FileStorage,
}

impl FileCheckpointer {
    /// Checkpoints stored under `dir`
    pub async fn new(dir: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            storage: FileStorage::new(dir).await?,
        })
    }

    /// Read the latest checkpoint
    pub async fn load(&self) -> anyhow::Result<Option<CheckpointRecord>> {
        match self.storage.read_optional(CHECKPOINT_FILE).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn checkpoint(&self, state: &RepositoryState) -> anyhow::Result<()> {
        let record = CheckpointRecord {
            generation: state.generation,
            taken_at: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_vec(&record)?;
        self.storage.write_atomic(CHECKPOINT_FILE, &json).await?;
        debug!(generation = state.generation, bytes = json.len(), "Checkpoint written");
        Ok(())
    }

    async fn last_generation(&self) -> anyhow::Result<Option<u64>> {
        Ok(self.load().await?.map(|record| record.generation))
    }
}

/// Whether a checkpoint at `checkpointed` trails the repository generation
pub fn is_lagging(checkpointed: Option<u64>, repository_generation: u64) -> bool {
    match checkpointed {
        Some(generation) => generation < repository_generation,
        None => repository_generation > 0,
    }
}

/// Re-derive the checkpoint from `state` when it lags, returning whether it did
pub async fn repair(checkpointer: &dyn Checkpointer, state: &RepositoryState) -> anyhow::Result<bool> {
    let checkpointed = checkpointer.last_generation().await?;
    if !is_lagging(checkpointed, state.generation) {
        return Ok(false);
    }

    info!(
        checkpoint = ?checkpointed,
        repository = state.generation,
        "Checkpoint lags repository, re-deriving"
    );
    checkpointer.checkpoint(state).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwdepot_repository::FirmwareRepository;
    use tempfile::TempDir;

    #[test]
    fn test_lag_detection() {
        assert!(!is_lagging(None, 0));
        assert!(is_lagging(None, 1));
        assert!(is_lagging(Some(2), 3));
        assert!(!is_lagging(Some(3), 3));
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip_and_repair() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let checkpointer = FileCheckpointer::new(&temp_dir.path().join("checkpoint")).await?;
        assert_eq!(checkpointer.last_generation().await?, None);

        let repo = FirmwareRepository::open(&temp_dir.path().join("db")).await?;
        let txn = repo.begin().await;
        txn.commit().await?;
        let state = repo.snapshot();

        assert!(repair(&checkpointer, &state).await?);
        assert_eq!(checkpointer.last_generation().await?, Some(1));
        assert!(!repair(&checkpointer, &state).await?);

        let record = checkpointer.load().await?;
        assert_eq!(record.map(|r| r.state), Some(RepositoryState::clone(&state)));
        Ok(())
    }
}
