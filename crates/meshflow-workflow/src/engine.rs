use crate::config::WorkflowConfig;
use crate::definition::{StepContext, WorkflowDefinition, WorkflowStepDefinition};
use crate::retry::RetryPolicy;
use meshflow_checkpoint::{CheckpointStatus, CheckpointStore, ExecutionCheckpoint};
use meshflow_core::{ApprovalPort, MeshflowError, MeshflowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether run results keep the checkpoints they produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointRetention {
    /// Every checkpoint of the run is returned in the result.
    #[default]
    All,
    /// Only `checkpoints_created` is reported. Use for very long runs.
    CountOnly,
}

/// Lifecycle of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    /// A checkpoint was found; execution continues after it.
    Resuming { from_checkpoint: u32 },
    Running { step_number: u32 },
    Completed,
    Failed { step_number: u32 },
}

/// Summary of one call to [`WorkflowEngine::execute_workflow`].
///
/// Counts cover this run only; steps skipped because of an earlier
/// checkpoint are reflected in `resumed_from_step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub workflow_id: String,
    pub workflow_name: String,
    pub success: bool,
    pub state: RunState,
    pub completed_steps: usize,
    pub steps_failed: usize,
    pub checkpoints: Vec<ExecutionCheckpoint>,
    pub checkpoints_created: usize,
    pub resumed_from_step: Option<u32>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl WorkflowExecutionResult {
    fn new(definition: &WorkflowDefinition) -> Self {
        Self {
            workflow_id: definition.workflow_id.clone(),
            workflow_name: definition.name.clone(),
            success: false,
            state: RunState::NotStarted,
            completed_steps: 0,
            steps_failed: 0,
            checkpoints: Vec::new(),
            checkpoints_created: 0,
            resumed_from_step: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// A failed result for a run that never reached the engine
    /// (e.g. refused by a caller-side governance check).
    pub fn rejected(definition: &WorkflowDefinition, reason: impl Into<String>) -> Self {
        let mut result = Self::new(definition);
        result.error = Some(reason.into());
        result
    }

    fn record(&mut self, checkpoint: ExecutionCheckpoint, retention: CheckpointRetention) {
        self.checkpoints_created += 1;
        if retention == CheckpointRetention::All {
            self.checkpoints.push(checkpoint);
        }
    }
}

/// Where a run starts, derived once from the latest checkpoint.
struct ResumePoint {
    start_index: usize,
    previous_state: Value,
    resumed_from_step: Option<u32>,
}

impl ResumePoint {
    fn derive(
        definition: &WorkflowDefinition,
        latest: Option<&ExecutionCheckpoint>,
    ) -> MeshflowResult<Self> {
        let Some(checkpoint) = latest else {
            return Ok(Self {
                start_index: 0,
                previous_state: Value::Null,
                resumed_from_step: None,
            });
        };

        let stored = checkpoint.state().map_err(|e| {
            MeshflowError::Checkpoint(format!(
                "unreadable state in checkpoint {} of '{}': {e}",
                checkpoint.step_number, checkpoint.workflow_id
            ))
        })?;

        // Completed at k resumes at k+1; anything else re-attempts k.
        let (first_step, previous_state) = match checkpoint.status {
            CheckpointStatus::Completed => (u64::from(checkpoint.step_number) + 1, stored),
            CheckpointStatus::Failed => (
                u64::from(checkpoint.step_number),
                stored.get("input_state").cloned().unwrap_or(Value::Null),
            ),
            CheckpointStatus::Pending | CheckpointStatus::Running => {
                (u64::from(checkpoint.step_number), Value::Null)
            }
        };

        let start_index = definition
            .steps
            .iter()
            .position(|s| u64::from(s.step_number) >= first_step)
            .unwrap_or(definition.steps.len());

        Ok(Self {
            start_index,
            previous_state,
            resumed_from_step: Some(checkpoint.step_number),
        })
    }
}

enum StepOutcome {
    Completed(Map<String, Value>),
    Failed { error: String, attempts: u32 },
}

/// Executes workflow definitions one step at a time against a checkpoint store.
///
/// Steps of one run never overlap. Distinct workflow ids may run
/// concurrently on the same engine.
pub struct WorkflowEngine {
    store: Arc<dyn CheckpointStore>,
    approval: Option<Arc<dyn ApprovalPort>>,
    retry: RetryPolicy,
    retention: CheckpointRetention,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            approval: None,
            retry: RetryPolicy::default(),
            retention: CheckpointRetention::All,
        }
    }

    pub fn from_config(store: Arc<dyn CheckpointStore>, config: &WorkflowConfig) -> Self {
        let retention = if config.retain_checkpoints {
            CheckpointRetention::All
        } else {
            CheckpointRetention::CountOnly
        };
        Self::new(store)
            .with_retry_policy(config.retry)
            .with_retention(retention)
    }

    /// Gate steps that require a governance check behind this port.
    /// Pre-approved workflows never consult it.
    pub fn with_approval(mut self, approval: Arc<dyn ApprovalPort>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retention(mut self, retention: CheckpointRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Run (or resume) a workflow.
    ///
    /// Returns `Err` only for cancellation, an invalid definition, or a
    /// checkpoint store failure. Step failures are reported in the result.
    pub async fn execute_workflow(
        &self,
        definition: &WorkflowDefinition,
        cancel: &CancellationToken,
    ) -> MeshflowResult<WorkflowExecutionResult> {
        if cancel.is_cancelled() {
            return Err(MeshflowError::Cancelled);
        }
        definition.validate()?;

        let start = Instant::now();
        let mut result = WorkflowExecutionResult::new(definition);

        let latest = self
            .store
            .get_latest_checkpoint(&definition.workflow_id)
            .await?;
        let resume = ResumePoint::derive(definition, latest.as_ref())?;
        result.resumed_from_step = resume.resumed_from_step;

        match resume.resumed_from_step {
            Some(step) => {
                result.state = RunState::Resuming {
                    from_checkpoint: step,
                };
                info!(
                    workflow_id = %definition.workflow_id,
                    workflow = %definition.name,
                    checkpoint_step = step,
                    remaining_steps = definition.steps.len() - resume.start_index,
                    "Resuming workflow from checkpoint"
                );
            }
            None => {
                info!(
                    workflow_id = %definition.workflow_id,
                    workflow = %definition.name,
                    steps = definition.steps.len(),
                    pre_approved = definition.is_pre_approved,
                    "Starting workflow"
                );
            }
        }

        let mut previous_state = Arc::new(resume.previous_state);

        for step in &definition.steps[resume.start_index..] {
            if cancel.is_cancelled() {
                warn!(
                    workflow_id = %definition.workflow_id,
                    step = step.step_number,
                    "Workflow cancelled before step"
                );
                return Err(MeshflowError::Cancelled);
            }
            result.state = RunState::Running {
                step_number: step.step_number,
            };

            if let Some(reason) = self.governance_denial(definition, step).await {
                self.fail_step(definition, step, &mut result, reason, 0, &previous_state)
                    .await?;
                result.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(result);
            }

            match self
                .run_step(definition, step, &previous_state, cancel)
                .await?
            {
                StepOutcome::Completed(updates) => {
                    let checkpoint = ExecutionCheckpoint::new(
                        &definition.workflow_id,
                        step.step_number,
                        &*step.name,
                        CheckpointStatus::Completed,
                        serde_json::to_string(&updates)?,
                    );
                    self.store.save_checkpoint(&checkpoint).await?;
                    debug!(
                        workflow_id = %definition.workflow_id,
                        step = step.step_number,
                        status = %CheckpointStatus::Completed,
                        "Step checkpointed"
                    );
                    result.completed_steps += 1;
                    result.record(checkpoint, self.retention);
                    previous_state = Arc::new(Value::Object(updates));
                }
                StepOutcome::Failed { error, attempts } => {
                    self.fail_step(
                        definition,
                        step,
                        &mut result,
                        error,
                        attempts,
                        &previous_state,
                    )
                    .await?;
                    result.duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(result);
                }
            }
        }

        result.success = true;
        result.state = RunState::Completed;
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            workflow_id = %definition.workflow_id,
            completed_steps = result.completed_steps,
            checkpoints = result.checkpoints_created,
            duration_ms = result.duration_ms,
            "Workflow completed"
        );
        Ok(result)
    }

    /// Invoke one step, retrying up to `max_retry_per_step` times.
    async fn run_step(
        &self,
        definition: &WorkflowDefinition,
        step: &WorkflowStepDefinition,
        previous_state: &Arc<Value>,
        cancel: &CancellationToken,
    ) -> MeshflowResult<StepOutcome> {
        let attempts_allowed = definition.max_retry_per_step.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts_allowed {
            let ctx = StepContext {
                workflow_id: definition.workflow_id.clone(),
                step_number: step.step_number,
                attempt,
                previous_state: Arc::clone(previous_state),
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MeshflowError::Cancelled),
                outcome = (step.execute)(ctx, cancel.clone()) => outcome,
            };

            match outcome {
                Ok(step_result) if step_result.success => {
                    return Ok(StepOutcome::Completed(step_result.state_updates));
                }
                Ok(step_result) => {
                    last_error = step_result
                        .error
                        .unwrap_or_else(|| "step reported failure".to_string());
                }
                Err(MeshflowError::Cancelled) => return Err(MeshflowError::Cancelled),
                Err(e) => last_error = e.to_string(),
            }

            if attempt + 1 < attempts_allowed {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    workflow_id = %definition.workflow_id,
                    step = step.step_number,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Step failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(MeshflowError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        Ok(StepOutcome::Failed {
            error: last_error,
            attempts: attempts_allowed,
        })
    }

    /// `Some(reason)` when a governed step is refused.
    async fn governance_denial(
        &self,
        definition: &WorkflowDefinition,
        step: &WorkflowStepDefinition,
    ) -> Option<String> {
        if definition.is_pre_approved || !step.requires_governance_check {
            return None;
        }
        let approval = self.approval.as_ref()?;

        let actor = format!("workflow:{}", definition.workflow_id);
        let action = format!(
            "Execute step {} '{}' of workflow '{}'",
            step.step_number, step.name, definition.name
        );
        let payload = serde_json::json!({
            "workflow_id": definition.workflow_id,
            "workflow_name": definition.name,
            "step_number": step.step_number,
            "step_name": &*step.name,
        });

        match approval.request_approval(&actor, &action, &payload).await {
            Ok(true) => None,
            Ok(false) => Some(format!(
                "Approval denied for step {} '{}'",
                step.step_number, step.name
            )),
            Err(e) => {
                warn!(
                    workflow_id = %definition.workflow_id,
                    step = step.step_number,
                    error = %e,
                    "Approval port failed; refusing governed step"
                );
                Some(format!(
                    "Approval unavailable for step {} '{}': {e}",
                    step.step_number, step.name
                ))
            }
        }
    }

    async fn fail_step(
        &self,
        definition: &WorkflowDefinition,
        step: &WorkflowStepDefinition,
        result: &mut WorkflowExecutionResult,
        error: String,
        attempts: u32,
        previous_state: &Value,
    ) -> MeshflowResult<()> {
        let state = serde_json::json!({
            "error": error,
            "attempts": attempts,
            "input_state": previous_state,
        });
        let checkpoint = ExecutionCheckpoint::new(
            &definition.workflow_id,
            step.step_number,
            &*step.name,
            CheckpointStatus::Failed,
            state.to_string(),
        );
        self.store.save_checkpoint(&checkpoint).await?;
        warn!(
            workflow_id = %definition.workflow_id,
            step = step.step_number,
            attempts,
            status = %CheckpointStatus::Failed,
            error = %error,
            "Step failed, stopping workflow"
        );

        result.steps_failed += 1;
        result.state = RunState::Failed {
            step_number: step.step_number,
        };
        result.error = Some(error);
        result.record(checkpoint, self.retention);
        Ok(())
    }
}
