use crate::engine::OrchestrationEngine;
use crate::types::{AgentExecutionResponse, AgentTask};
use meshflow_core::MeshflowResult;
use meshflow_workflow::{
    TemplateParameters, TemplateRegistry, WorkflowDefinition, WorkflowEngine,
    WorkflowExecutionResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Work submitted to the router.
pub enum TaskRequest {
    /// A concrete workflow definition.
    Workflow(WorkflowDefinition),
    /// A workflow built from a registered template.
    Template {
        template_id: String,
        parameters: TemplateParameters,
    },
    /// A multi-agent task.
    Agents(AgentTask),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteTarget {
    WorkflowEngine,
    OrchestrationEngine,
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::WorkflowEngine => write!(f, "WorkflowEngine"),
            RouteTarget::OrchestrationEngine => write!(f, "OrchestrationEngine"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteResult {
    Workflow(WorkflowExecutionResult),
    Agents(AgentExecutionResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub routed_to: RouteTarget,
    /// The request ran on the pre-approved path without governance checks.
    pub governance_skipped: bool,
    pub result: RouteResult,
}

impl RouteOutcome {
    pub fn is_success(&self) -> bool {
        match &self.result {
            RouteResult::Workflow(r) => r.success,
            RouteResult::Agents(r) => r.is_success,
        }
    }
}

/// Stateless dispatch between the workflow engine and the orchestrator.
#[derive(Clone)]
pub struct TaskRouter {
    workflows: Arc<WorkflowEngine>,
    templates: Arc<TemplateRegistry>,
    orchestrator: Arc<OrchestrationEngine>,
}

impl TaskRouter {
    pub fn new(
        workflows: Arc<WorkflowEngine>,
        templates: Arc<TemplateRegistry>,
        orchestrator: Arc<OrchestrationEngine>,
    ) -> Self {
        Self {
            workflows,
            templates,
            orchestrator,
        }
    }

    pub async fn route_task(
        &self,
        request: TaskRequest,
        cancel: &CancellationToken,
    ) -> MeshflowResult<RouteOutcome> {
        let definition = match request {
            TaskRequest::Agents(task) => {
                info!(routed_to = %RouteTarget::OrchestrationEngine, pattern = %task.pattern, "Routing task");
                let response = self.orchestrator.execute_task(&task, cancel).await?;
                return Ok(RouteOutcome {
                    routed_to: RouteTarget::OrchestrationEngine,
                    governance_skipped: false,
                    result: RouteResult::Agents(response),
                });
            }
            TaskRequest::Workflow(definition) => definition,
            TaskRequest::Template {
                template_id,
                parameters,
            } => self
                .templates
                .create_workflow_from_token(&template_id, &parameters)?,
        };

        let governance_skipped = definition.is_pre_approved;
        info!(
            routed_to = %RouteTarget::WorkflowEngine,
            workflow = %definition.name,
            governance_skipped,
            "Routing task"
        );
        let result = self.workflows.execute_workflow(&definition, cancel).await?;
        Ok(RouteOutcome {
            routed_to: RouteTarget::WorkflowEngine,
            governance_skipped,
            result: RouteResult::Workflow(result),
        })
    }
}
