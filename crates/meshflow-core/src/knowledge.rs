//! Knowledge repository port: agent definitions and learning insights that
//! outlive a single run.

#![deny(missing_docs)]

use crate::agent::AgentDefinition;
use crate::MeshflowResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fact learned during execution and shared with other agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLearningInsight {
    /// Unique id assigned at creation.
    pub insight_id: Uuid,
    /// Agent type that produced the insight (`"Orchestrator"` for run summaries).
    pub generating_agent_type: String,
    /// Category, e.g. `"SuccessfulWorkflow"`.
    pub insight_type: String,
    /// Free-form payload.
    pub insight_data: serde_json::Value,
    /// Producer's confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Creation time, used to order equally confident insights.
    pub created_at: DateTime<Utc>,
}

impl AgentLearningInsight {
    /// New insight with a fresh id, stamped now.
    pub fn new(
        generating_agent_type: impl Into<String>,
        insight_type: impl Into<String>,
        insight_data: serde_json::Value,
        confidence_score: f64,
    ) -> Self {
        Self {
            insight_id: Uuid::new_v4(),
            generating_agent_type: generating_agent_type.into(),
            insight_type: insight_type.into(),
            insight_data,
            confidence_score,
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive match of `topic` against type, author and payload.
    pub fn matches_topic(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        self.insight_type.to_lowercase().contains(&topic)
            || self.generating_agent_type.to_lowercase().contains(&topic)
            || self.insight_data.to_string().to_lowercase().contains(&topic)
    }
}

/// Durable home of agent definitions and shared insights. Append-only from
/// the core's point of view.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Persist (or replace) the definition for its agent type.
    async fn store_agent_definition(&self, definition: &AgentDefinition) -> MeshflowResult<()>;
    /// Append one insight.
    async fn store_learning_insight(&self, insight: AgentLearningInsight) -> MeshflowResult<()>;
    /// Insights matching `topic`, most relevant first.
    async fn get_relevant_insights(&self, topic: &str) -> MeshflowResult<Vec<AgentLearningInsight>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matching() {
        let insight = AgentLearningInsight::new(
            "Orchestrator",
            "SuccessfulWorkflow",
            serde_json::json!({"goal": "Quarterly Report"}),
            0.9,
        );
        assert!(insight.matches_topic("successful"));
        assert!(insight.matches_topic("orchestrator"));
        assert!(insight.matches_topic("quarterly"));
        assert!(!insight.matches_topic("payroll"));
    }
}
