use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// `[workflow]` section of the meshflow configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Retries applied to workflows built without an explicit value
    /// (templates and the CLI demos read this).
    #[serde(default = "default_max_retry_per_step")]
    pub default_max_retry_per_step: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Keep every checkpoint in run results. Disable for very long runs.
    #[serde(default = "default_retain_checkpoints")]
    pub retain_checkpoints: bool,
}

fn default_max_retry_per_step() -> u32 {
    3
}

fn default_retain_checkpoints() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_max_retry_per_step: default_max_retry_per_step(),
            retry: RetryPolicy::default(),
            retain_checkpoints: default_retain_checkpoints(),
        }
    }
}
