use chrono::{DateTime, Utc};
use meshflow_core::AgentDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How the members of a team are coordinated during one run.
///
/// Unknown names deserialize to [`CoordinationPattern::Custom`] and are
/// rejected at execution time unless a strategy was registered for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CoordinationPattern {
    /// Every agent runs concurrently.
    Parallel,
    /// A lead agent decides; subordinates follow up.
    Hierarchical,
    /// Every agent produces a candidate and the best one wins.
    Competitive,
    /// Agents iterate until one of them signals convergence.
    CollaborativeSwarm,
    Custom(String),
}

impl CoordinationPattern {
    /// Stable name used to look up the strategy.
    pub fn name(&self) -> &str {
        match self {
            CoordinationPattern::Parallel => "parallel",
            CoordinationPattern::Hierarchical => "hierarchical",
            CoordinationPattern::Competitive => "competitive",
            CoordinationPattern::CollaborativeSwarm => "collaborative_swarm",
            CoordinationPattern::Custom(name) => name,
        }
    }
}

impl From<String> for CoordinationPattern {
    fn from(value: String) -> Self {
        match value.to_lowercase().replace(['-', ' '], "_").as_str() {
            "parallel" => CoordinationPattern::Parallel,
            "hierarchical" => CoordinationPattern::Hierarchical,
            "competitive" => CoordinationPattern::Competitive,
            "collaborative_swarm" | "collaborativeswarm" | "swarm" => {
                CoordinationPattern::CollaborativeSwarm
            }
            _ => CoordinationPattern::Custom(value),
        }
    }
}

impl From<&str> for CoordinationPattern {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<CoordinationPattern> for String {
    fn from(value: CoordinationPattern) -> Self {
        value.name().to_string()
    }
}

impl std::fmt::Display for CoordinationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Input to one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub goal: String,
    pub pattern: CoordinationPattern,
    pub required_agent_types: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl AgentTask {
    pub fn new(goal: impl Into<String>, pattern: impl Into<CoordinationPattern>) -> Self {
        Self {
            goal: goal.into(),
            pattern: pattern.into(),
            required_agent_types: Vec::new(),
            context: HashMap::new(),
        }
    }

    pub fn with_agents<I, S>(mut self, agent_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_agent_types = agent_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// One provisioned agent on a team.
#[derive(Debug, Clone)]
pub struct TeamMember {
    pub definition: AgentDefinition,
    /// Instance provisioned by the runtime for this run.
    pub instance_id: Uuid,
    pub registration_order: u64,
}

impl TeamMember {
    pub fn agent_type(&self) -> &str {
        &self.definition.agent_type
    }
}

/// What happened to a single agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed { output: String, confidence: f64 },
    /// Stopped by a gate (ethics, authority, or approval).
    Rejected { reason: String },
    /// The agent logic itself failed.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActionResult {
    pub agent_id: Uuid,
    pub agent_type: String,
    pub outcome: ActionOutcome,
    /// The ethics check could not be performed and the action went ahead.
    #[serde(default)]
    pub ethics_unavailable: bool,
}

impl AgentActionResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Completed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Rejected { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            ActionOutcome::Completed { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self.outcome {
            ActionOutcome::Completed { confidence, .. } => Some(confidence),
            _ => None,
        }
    }
}

/// Output of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResponse {
    pub task_id: Uuid,
    pub is_success: bool,
    pub summary: String,
    pub agent_ids_involved: Vec<Uuid>,
    pub audit_trail_id: Uuid,
    pub pattern: CoordinationPattern,
    /// The run's authoritative output, when the pattern produced one.
    pub output: Option<String>,
    #[serde(default)]
    pub results: Vec<AgentActionResult>,
    pub duration_ms: u64,
}

impl AgentExecutionResponse {
    pub(crate) fn failed(
        task_id: Uuid,
        audit_trail_id: Uuid,
        pattern: CoordinationPattern,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            is_success: false,
            summary: summary.into(),
            agent_ids_involved: Vec::new(),
            audit_trail_id,
            pattern,
            output: None,
            results: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Phase of an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Assembling,
    Validating,
    Executing,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPhase::Assembling => write!(f, "assembling"),
            TaskPhase::Validating => write!(f, "validating"),
            TaskPhase::Executing => write!(f, "executing"),
        }
    }
}

/// Entry in the active-task registry. Removed once the run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTaskStatus {
    pub task_id: Uuid,
    pub goal: String,
    pub pattern: CoordinationPattern,
    pub phase: TaskPhase,
    pub started_at: DateTime<Utc>,
}

/// A request to provision a new instance of a registered agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub agent_type: String,
    /// Run that asked for the instance, if any.
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl SpawnRequest {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            parent_task_id: None,
            context: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, task_id: Uuid) -> Self {
        self.parent_task_id = Some(task_id);
        self
    }
}
