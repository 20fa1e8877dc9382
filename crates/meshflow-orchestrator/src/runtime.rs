use crate::types::{AgentTask, SpawnRequest};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use meshflow_core::{MeshflowError, MeshflowResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What an agent's logic returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub output: String,
    /// Self-reported confidence in `[0, 1]`, used by the competitive pattern.
    pub confidence: f64,
}

impl AgentOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

pub type AgentHandler =
    Arc<dyn Fn(AgentTask) -> BoxFuture<'static, MeshflowResult<AgentOutput>> + Send + Sync>;

/// Provisions agent instances and runs their logic.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Create a logical instance of `request.agent_type` and return its id.
    async fn provision_instance(&self, request: &SpawnRequest) -> MeshflowResult<Uuid>;

    /// Run the logic bound to the instance's agent type.
    async fn execute_agent_logic(&self, agent_id: Uuid, task: &AgentTask)
        -> MeshflowResult<AgentOutput>;

    /// Forget an instance once its run is over.
    async fn release_instance(&self, _agent_id: Uuid) {}
}

/// Runs agent logic as in-process async functions, one handler per type.
#[derive(Default)]
pub struct InProcessAgentRuntime {
    handlers: RwLock<HashMap<String, AgentHandler>>,
    instances: RwLock<HashMap<Uuid, String>>,
}

impl InProcessAgentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `agent_type`. A later registration replaces it.
    pub fn register_handler<F, Fut>(&self, agent_type: impl Into<String>, handler: F)
    where
        F: Fn(AgentTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MeshflowResult<AgentOutput>> + Send + 'static,
    {
        let agent_type = agent_type.into();
        let boxed: AgentHandler = Arc::new(
            move |task: AgentTask| -> BoxFuture<'static, MeshflowResult<AgentOutput>> {
                Box::pin(handler(task))
            },
        );
        info!(agent_type = %agent_type, "Agent handler registered");
        self.handlers.write().insert(agent_type, boxed);
    }

    pub fn has_handler(&self, agent_type: &str) -> bool {
        self.handlers.read().contains_key(agent_type)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Agent type of a provisioned instance.
    pub fn instance_type(&self, agent_id: Uuid) -> Option<String> {
        self.instances.read().get(&agent_id).cloned()
    }
}

#[async_trait]
impl AgentRuntime for InProcessAgentRuntime {
    async fn provision_instance(&self, request: &SpawnRequest) -> MeshflowResult<Uuid> {
        let agent_id = Uuid::new_v4();
        self.instances
            .write()
            .insert(agent_id, request.agent_type.clone());
        debug!(
            agent_id = %agent_id,
            agent_type = %request.agent_type,
            parent_task = ?request.parent_task_id,
            "Agent instance provisioned"
        );
        Ok(agent_id)
    }

    async fn execute_agent_logic(
        &self,
        agent_id: Uuid,
        task: &AgentTask,
    ) -> MeshflowResult<AgentOutput> {
        let agent_type = self.instance_type(agent_id).ok_or_else(|| {
            MeshflowError::Validation(format!("Unknown agent instance {agent_id}"))
        })?;
        let handler = self
            .handlers
            .read()
            .get(&agent_type)
            .cloned()
            .ok_or_else(|| MeshflowError::HandlerNotFound(agent_type.clone()))?;
        handler(task.clone()).await
    }

    async fn release_instance(&self, agent_id: Uuid) {
        self.instances.write().remove(&agent_id);
    }
}
