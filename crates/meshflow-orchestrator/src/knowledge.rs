use async_trait::async_trait;
use meshflow_core::{AgentDefinition, AgentLearningInsight, KnowledgeRepository, MeshflowResult};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local knowledge repository. Insights are append-only.
#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    definitions: RwLock<HashMap<String, AgentDefinition>>,
    insights: RwLock<Vec<AgentLearningInsight>>,
}

impl InMemoryKnowledgeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insight_count(&self) -> usize {
        self.insights.read().await.len()
    }

    pub async fn definition(&self, agent_type: &str) -> Option<AgentDefinition> {
        self.definitions.read().await.get(agent_type).cloned()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn store_agent_definition(&self, definition: &AgentDefinition) -> MeshflowResult<()> {
        self.definitions
            .write()
            .await
            .insert(definition.agent_type.clone(), definition.clone());
        Ok(())
    }

    async fn store_learning_insight(&self, insight: AgentLearningInsight) -> MeshflowResult<()> {
        self.insights.write().await.push(insight);
        Ok(())
    }

    /// Matching insights, most confident first, newest first on ties.
    async fn get_relevant_insights(&self, topic: &str) -> MeshflowResult<Vec<AgentLearningInsight>> {
        let mut matches: Vec<AgentLearningInsight> = self
            .insights
            .read()
            .await
            .iter()
            .filter(|i| i.matches_topic(topic))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(matches)
    }
}
