use meshflow_checkpoint::CheckpointConfig;
use meshflow_orchestrator::OrchestrationConfig;
use meshflow_workflow::WorkflowConfig;
use serde::Deserialize;
use std::path::Path;

/// Top-level `meshflow.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshflowConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl MeshflowConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Ok(toml::from_str(&raw)?)
    }
}
