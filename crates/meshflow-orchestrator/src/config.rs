use crate::strategy::ConvergencePolicy;
use serde::{Deserialize, Serialize};

/// Orchestration engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Upper bound on swarm rounds before a run is declared unconverged.
    #[serde(default = "default_swarm_max_iterations")]
    pub swarm_max_iterations: u32,
    /// Output prefix an agent uses to signal that the swarm has converged.
    #[serde(default = "default_swarm_completion_sentinel")]
    pub swarm_completion_sentinel: String,
    /// Maximum concurrent agent invocations in the parallel pattern.
    #[serde(default)]
    pub parallel_limit: Option<usize>,
}

fn default_swarm_max_iterations() -> u32 {
    1000
}

fn default_swarm_completion_sentinel() -> String {
    "FINAL:".to_string()
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            swarm_max_iterations: default_swarm_max_iterations(),
            swarm_completion_sentinel: default_swarm_completion_sentinel(),
            parallel_limit: None,
        }
    }
}

impl OrchestrationConfig {
    pub fn convergence_policy(&self) -> ConvergencePolicy {
        ConvergencePolicy::new(
            self.swarm_completion_sentinel.clone(),
            self.swarm_max_iterations,
        )
    }
}
