use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How much independent action an agent may take before confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Never performs the side-effecting action on its own.
    RecommendOnly,
    /// Acts once an approval has been granted.
    #[default]
    ActWithConfirmation,
    /// Acts without asking.
    FullyAutonomous,
}

impl AutonomyLevel {
    /// Whether an action at this level must pass through the approval port.
    ///
    /// `RecommendOnly` is treated like `ActWithConfirmation`: the action only
    /// runs when a reviewer explicitly approves it.
    pub fn requires_approval(self) -> bool {
        !matches!(self, AutonomyLevel::FullyAutonomous)
    }
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutonomyLevel::RecommendOnly => write!(f, "recommend_only"),
            AutonomyLevel::ActWithConfirmation => write!(f, "act_with_confirmation"),
            AutonomyLevel::FullyAutonomous => write!(f, "fully_autonomous"),
        }
    }
}

/// Boundaries of what an agent is authorized to touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorityScope {
    #[serde(default)]
    pub allowed_api_endpoints: Vec<String>,
    #[serde(default)]
    pub max_resource_consumption: Option<f64>,
    #[serde(default)]
    pub max_budget: Option<f64>,
    #[serde(default)]
    pub data_access_policies: Vec<String>,
}

impl AuthorityScope {
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.allowed_api_endpoints = endpoints;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.max_budget = Some(budget);
        self
    }
}

/// Lifecycle status of a registered agent definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
    Retired,
}

/// A registered kind of agent the orchestrator can put on a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub agent_id: Uuid,
    /// Team assembly key; one definition per type.
    pub agent_type: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub default_autonomy_level: AutonomyLevel,
    #[serde(default)]
    pub default_authority_scope: AuthorityScope,
    #[serde(default)]
    pub status: AgentStatus,
}

impl AgentDefinition {
    pub fn new(agent_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent_id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            description: description.into(),
            capabilities: Vec::new(),
            default_autonomy_level: AutonomyLevel::default(),
            default_authority_scope: AuthorityScope::default(),
            status: AgentStatus::Active,
        }
    }

    pub fn with_autonomy(mut self, level: AutonomyLevel) -> Self {
        self.default_autonomy_level = level;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_authority(mut self, scope: AuthorityScope) -> Self {
        self.default_authority_scope = scope;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
