use futures_util::future::BoxFuture;
use meshflow_core::{MeshflowError, MeshflowResult};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What a step function sees when it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workflow_id: String,
    pub step_number: u32,
    /// Zero for the first attempt, incremented on each retry.
    pub attempt: u32,
    /// State updates of the previous completed step (`null` for the first step).
    pub previous_state: Arc<Value>,
}

/// Outcome reported by a step function.
#[derive(Debug, Clone, Default)]
pub struct WorkflowStepResult {
    pub success: bool,
    pub state_updates: Map<String, Value>,
    pub error: Option<String>,
}

impl WorkflowStepResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            state_updates: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_updates.insert(key.into(), value);
        self
    }
}

/// Boxed step function: `(context, cancel) -> result`.
pub type StepFn = Arc<
    dyn Fn(StepContext, CancellationToken) -> BoxFuture<'static, MeshflowResult<WorkflowStepResult>>
        + Send
        + Sync,
>;

/// One unit of work in a workflow.
#[derive(Clone)]
pub struct WorkflowStepDefinition {
    pub step_number: u32,
    pub name: Arc<str>,
    pub execute: StepFn,
    pub requires_governance_check: bool,
}

impl WorkflowStepDefinition {
    pub fn new<F, Fut>(step_number: u32, name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(StepContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MeshflowResult<WorkflowStepResult>> + Send + 'static,
    {
        let execute: StepFn = Arc::new(
            move |ctx: StepContext,
                  cancel: CancellationToken|
                  -> BoxFuture<'static, MeshflowResult<WorkflowStepResult>> {
                Box::pin(func(ctx, cancel))
            },
        );
        Self::from_fn(step_number, name, execute)
    }

    /// Build from an already boxed step function, sharing it between steps.
    pub fn from_fn(step_number: u32, name: impl Into<Arc<str>>, execute: StepFn) -> Self {
        Self {
            step_number,
            name: name.into(),
            execute,
            requires_governance_check: true,
        }
    }

    pub fn with_governance_check(mut self, required: bool) -> Self {
        self.requires_governance_check = required;
        self
    }
}

impl std::fmt::Debug for WorkflowStepDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStepDefinition")
            .field("step_number", &self.step_number)
            .field("name", &self.name)
            .field("requires_governance_check", &self.requires_governance_check)
            .finish_non_exhaustive()
    }
}

/// An ordered list of steps plus the run policy.
///
/// `workflow_id` is the checkpoint key: executing a definition with the id of
/// an interrupted run resumes that run.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub name: String,
    pub steps: Vec<WorkflowStepDefinition>,
    pub max_retry_per_step: u32,
    pub is_pre_approved: bool,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow_id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps: Vec::new(),
            max_retry_per_step: 0,
            is_pre_approved: false,
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }

    pub fn with_max_retry(mut self, retries: u32) -> Self {
        self.max_retry_per_step = retries;
        self
    }

    pub fn pre_approved(mut self, approved: bool) -> Self {
        self.is_pre_approved = approved;
        self
    }

    /// Append a step numbered after the current last step (starting at 1).
    pub fn then<F, Fut>(mut self, name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(StepContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MeshflowResult<WorkflowStepResult>> + Send + 'static,
    {
        let next = self.steps.last().map_or(1, |s| s.step_number + 1);
        self.steps.push(WorkflowStepDefinition::new(next, name, func));
        self
    }

    pub fn push_step(&mut self, step: WorkflowStepDefinition) {
        self.steps.push(step);
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Steps must be non-empty, sorted and contiguous by step number.
    pub fn validate(&self) -> MeshflowResult<()> {
        if self.workflow_id.trim().is_empty() {
            return Err(MeshflowError::Validation(
                "workflow id must not be empty".to_string(),
            ));
        }
        let first = self.steps.first().ok_or_else(|| {
            MeshflowError::Validation(format!("workflow '{}' has no steps", self.name))
        })?;
        for (offset, step) in self.steps.iter().enumerate() {
            let expected = u64::from(first.step_number) + offset as u64;
            if u64::from(step.step_number) != expected {
                return Err(MeshflowError::Validation(format!(
                    "workflow '{}' steps are not contiguous: expected step {expected}, found {}",
                    self.name, step.step_number
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(name)
    }

    #[test]
    fn test_then_numbers_steps_from_one() {
        let def = noop("pipeline")
            .then("extract", |_, _| async { Ok(WorkflowStepResult::ok()) })
            .then("load", |_, _| async { Ok(WorkflowStepResult::ok()) });
        let numbers: Vec<u32> = def.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(def.steps.iter().all(|s| s.requires_governance_check));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_empty_workflow_is_invalid() {
        let err = noop("empty").validate().unwrap_err();
        assert!(err.to_string().contains("has no steps"));
    }

    #[test]
    fn test_gap_in_steps_is_invalid() {
        let mut def = noop("gappy");
        def.push_step(WorkflowStepDefinition::new(1, "a", |_, _| async {
            Ok(WorkflowStepResult::ok())
        }));
        def.push_step(WorkflowStepDefinition::new(3, "c", |_, _| async {
            Ok(WorkflowStepResult::ok())
        }));
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("not contiguous"));
    }

    #[test]
    fn test_step_result_builders() {
        let r = WorkflowStepResult::ok().with_state("rows", serde_json::json!(10));
        assert!(r.success);
        assert_eq!(r.state_updates["rows"], 10);

        let f = WorkflowStepResult::failure("disk full");
        assert!(!f.success);
        assert_eq!(f.error.as_deref(), Some("disk full"));
    }
}
