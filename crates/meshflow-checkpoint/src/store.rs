use crate::checkpoint::ExecutionCheckpoint;
use async_trait::async_trait;
use meshflow_core::{MeshflowError, MeshflowResult};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Append-only checkpoint log keyed by workflow id.
///
/// Implementations must tolerate concurrent writers for distinct workflow
/// ids. Writes for a single id are issued sequentially by the engine.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint. Never overwrites an earlier record.
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> MeshflowResult<()>;

    /// Highest step-number checkpoint for the workflow (ties broken by
    /// creation time), or `None` if the workflow has never run.
    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> MeshflowResult<Option<ExecutionCheckpoint>>;

    /// Retained history for the workflow, ordered by step then time.
    async fn list(&self, workflow_id: &str) -> MeshflowResult<Vec<ExecutionCheckpoint>>;
}

// ---------------------------------------------------------------------------
// InMemoryCheckpointStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorkflowLog {
    entries: VecDeque<ExecutionCheckpoint>,
    latest: Option<ExecutionCheckpoint>,
}

/// Process-local store. Optionally keeps only the newest `history_limit`
/// checkpoints per workflow; the latest checkpoint is always retained.
pub struct InMemoryCheckpointStore {
    logs: RwLock<HashMap<String, WorkflowLog>>,
    history_limit: Option<usize>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            history_limit: None,
        }
    }

    /// Keep at most `limit` checkpoints per workflow (minimum 1).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit.max(1));
        self
    }

    /// Number of workflows with at least one checkpoint.
    pub async fn workflow_count(&self) -> usize {
        self.logs.read().await.len()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> MeshflowResult<()> {
        let mut logs = self.logs.write().await;
        let log = logs.entry(checkpoint.workflow_id.clone()).or_default();

        let newer = log
            .latest
            .as_ref()
            .map_or(true, |latest| checkpoint.recency_cmp(latest).is_ge());
        if newer {
            log.latest = Some(checkpoint.clone());
        }

        log.entries.push_back(checkpoint.clone());
        if let Some(limit) = self.history_limit {
            while log.entries.len() > limit {
                log.entries.pop_front();
            }
        }
        Ok(())
    }

    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> MeshflowResult<Option<ExecutionCheckpoint>> {
        let logs = self.logs.read().await;
        Ok(logs.get(workflow_id).and_then(|log| log.latest.clone()))
    }

    async fn list(&self, workflow_id: &str) -> MeshflowResult<Vec<ExecutionCheckpoint>> {
        let logs = self.logs.read().await;
        let mut entries: Vec<ExecutionCheckpoint> = logs
            .get(workflow_id)
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.recency_cmp(b));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// FileCheckpointStore
// ---------------------------------------------------------------------------

/// One JSON Lines file per workflow id, opened in append mode for every write.
pub struct FileCheckpointStore {
    dir: PathBuf,
    sync_writes: bool,
}

impl FileCheckpointStore {
    pub async fn new(dir: PathBuf) -> MeshflowResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            sync_writes: true,
        })
    }

    /// Skip `fsync` after each append. Faster, but a crash may lose the tail.
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    fn log_path(&self, workflow_id: &str) -> PathBuf {
        let safe: String = workflow_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.checkpoints.jsonl"))
    }

    async fn read_all(&self, workflow_id: &str) -> MeshflowResult<Vec<ExecutionCheckpoint>> {
        let path = self.log_path(workflow_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionCheckpoint>(line) {
                Ok(cp) if cp.workflow_id == workflow_id => entries.push(cp),
                Ok(_) => {}
                // A torn final line is what a crash mid-append leaves behind.
                Err(e) if idx + 1 == data.lines().count() => {
                    debug!(workflow_id, error = %e, "Ignoring truncated checkpoint line");
                }
                Err(e) => {
                    return Err(MeshflowError::Checkpoint(format!(
                        "Corrupt checkpoint log for '{workflow_id}' at line {}: {e}",
                        idx + 1
                    )))
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &ExecutionCheckpoint) -> MeshflowResult<()> {
        let path = self.log_path(&checkpoint.workflow_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(checkpoint)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        if self.sync_writes {
            file.sync_data().await?;
        }
        Ok(())
    }

    async fn get_latest_checkpoint(
        &self,
        workflow_id: &str,
    ) -> MeshflowResult<Option<ExecutionCheckpoint>> {
        let entries = self.read_all(workflow_id).await?;
        Ok(entries.into_iter().max_by(|a, b| a.recency_cmp(b)))
    }

    async fn list(&self, workflow_id: &str) -> MeshflowResult<Vec<ExecutionCheckpoint>> {
        let mut entries = self.read_all(workflow_id).await?;
        entries.sort_by(|a, b| a.recency_cmp(b));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
