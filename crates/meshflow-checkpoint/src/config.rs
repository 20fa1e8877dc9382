use crate::store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use meshflow_core::MeshflowResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
}

/// `[checkpoint]` section of the meshflow configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// Directory for the file backend.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Checkpoints kept per workflow by the memory backend. Unbounded when unset.
    #[serde(default)]
    pub history_limit: Option<usize>,
    /// `fsync` after every append (file backend).
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

fn default_dir() -> PathBuf {
    PathBuf::from("./data/checkpoints")
}

fn default_sync_writes() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            dir: default_dir(),
            history_limit: None,
            sync_writes: default_sync_writes(),
        }
    }
}

impl CheckpointConfig {
    /// Build the configured store.
    pub async fn open_store(&self) -> MeshflowResult<Arc<dyn CheckpointStore>> {
        let store: Arc<dyn CheckpointStore> = match self.backend {
            CheckpointBackend::Memory => {
                let store = match self.history_limit {
                    Some(limit) => InMemoryCheckpointStore::new().with_history_limit(limit),
                    None => InMemoryCheckpointStore::new(),
                };
                Arc::new(store)
            }
            CheckpointBackend::File => {
                let store = FileCheckpointStore::new(self.dir.clone()).await?;
                if self.sync_writes {
                    Arc::new(store)
                } else {
                    Arc::new(store.without_sync())
                }
            }
        };
        Ok(store)
    }
}
