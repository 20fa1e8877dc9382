use crate::config::OrchestrationConfig;
use crate::ethics::{EthicsGate, EthicsVerdict};
use crate::registry::{AgentRegistry, EffectivePolicy};
use crate::runtime::AgentRuntime;
use crate::strategy::{
    CandidateScorer, CollaborativeSwarmStrategy, CompetitiveStrategy, CoordinationStrategy,
    HierarchicalStrategy, MemberInvoker, ParallelStrategy, UnsupportedStrategy,
};
use crate::types::{
    ActionOutcome, ActiveTaskStatus, AgentActionResult, AgentExecutionResponse, AgentTask,
    CoordinationPattern, SpawnRequest, TaskPhase, TeamMember,
};
use async_trait::async_trait;
use chrono::Utc;
use meshflow_core::{
    AgentDefinition, AgentLearningInsight, ApprovalPort, AuthorityScope, AutonomyLevel,
    KnowledgeRepository, MeshflowError, MeshflowResult,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Author of the insight emitted after every successful run.
pub const ORCHESTRATOR_AGENT_TYPE: &str = "Orchestrator";
/// Insight type emitted after every successful run.
pub const SUCCESSFUL_WORKFLOW_INSIGHT: &str = "SuccessfulWorkflow";

/// Runs agent tasks: assembles a team, gates every agent action, and
/// delegates coordination to the strategy registered for the task's pattern.
pub struct OrchestrationEngine {
    registry: Arc<AgentRegistry>,
    runtime: Arc<dyn AgentRuntime>,
    approval: Arc<dyn ApprovalPort>,
    knowledge: Arc<dyn KnowledgeRepository>,
    ethics: EthicsGate,
    strategies: HashMap<CoordinationPattern, Arc<dyn CoordinationStrategy>>,
    active_tasks: RwLock<HashMap<Uuid, ActiveTaskStatus>>,
}

impl OrchestrationEngine {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        approval: Arc<dyn ApprovalPort>,
        knowledge: Arc<dyn KnowledgeRepository>,
    ) -> Self {
        Self::with_config(runtime, approval, knowledge, &OrchestrationConfig::default())
    }

    pub fn with_config(
        runtime: Arc<dyn AgentRuntime>,
        approval: Arc<dyn ApprovalPort>,
        knowledge: Arc<dyn KnowledgeRepository>,
        config: &OrchestrationConfig,
    ) -> Self {
        let engine = Self {
            registry: Arc::new(AgentRegistry::new()),
            runtime,
            approval,
            knowledge,
            ethics: EthicsGate::new(),
            strategies: HashMap::new(),
            active_tasks: RwLock::new(HashMap::new()),
        };
        engine
            .with_strategy(Arc::new(ParallelStrategy::new(config.parallel_limit)))
            .with_strategy(Arc::new(HierarchicalStrategy))
            .with_strategy(Arc::new(CompetitiveStrategy::default()))
            .with_strategy(Arc::new(CollaborativeSwarmStrategy::new(
                config.convergence_policy(),
            )))
    }

    pub fn with_ethics(mut self, gate: EthicsGate) -> Self {
        self.ethics = gate;
        self
    }

    /// Replace the competitive pattern's candidate scorer.
    pub fn with_scorer(self, scorer: Arc<dyn CandidateScorer>) -> Self {
        self.with_strategy(Arc::new(CompetitiveStrategy::new(scorer)))
    }

    /// Register (or replace) the strategy for the pattern named by
    /// `strategy.name()`. Built-in names map to their built-in variant.
    pub fn with_strategy(mut self, strategy: Arc<dyn CoordinationStrategy>) -> Self {
        let pattern = CoordinationPattern::from(strategy.name());
        self.strategies.insert(pattern, strategy);
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Insert or replace the definition for its agent type and persist it.
    pub async fn register_agent(&self, definition: AgentDefinition) -> MeshflowResult<()> {
        if definition.agent_type.trim().is_empty() {
            return Err(MeshflowError::Validation(
                "agent type must not be empty".into(),
            ));
        }
        let is_new = self.registry.register(definition.clone());
        self.knowledge.store_agent_definition(&definition).await?;
        info!(
            agent_type = %definition.agent_type,
            autonomy = %definition.default_autonomy_level,
            new = is_new,
            "Agent registered"
        );
        Ok(())
    }

    /// Run one agent task to completion.
    ///
    /// Structural failures (no team, unsupported pattern) come back as an
    /// unsuccessful response. `Err` is reserved for cancellation, an empty
    /// goal, and infrastructure errors.
    pub async fn execute_task(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<AgentExecutionResponse> {
        if cancel.is_cancelled() {
            return Err(MeshflowError::Cancelled);
        }
        if task.goal.trim().is_empty() {
            return Err(MeshflowError::Validation("task goal must not be empty".into()));
        }

        let task_id = Uuid::new_v4();
        let start = Instant::now();
        let mut guard = RunGuard {
            task_id,
            active_tasks: &self.active_tasks,
            runtime: Arc::clone(&self.runtime),
            instances: Vec::new(),
        };
        self.active_tasks.write().insert(
            task_id,
            ActiveTaskStatus {
                task_id,
                goal: task.goal.clone(),
                pattern: task.pattern.clone(),
                phase: TaskPhase::Assembling,
                started_at: Utc::now(),
            },
        );
        info!(
            task_id = %task_id,
            pattern = %task.pattern,
            agents = ?task.required_agent_types,
            "Starting agent task"
        );

        let outcome = self.run_task(task_id, task, &mut guard, cancel).await;
        guard.release_instances().await;
        drop(guard);

        let mut response = outcome?;
        response.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            task_id = %task_id,
            success = response.is_success,
            agents = response.agent_ids_involved.len(),
            duration_ms = response.duration_ms,
            summary = %response.summary,
            "Agent task finished"
        );
        Ok(response)
    }

    async fn run_task(
        &self,
        task_id: Uuid,
        task: &AgentTask,
        guard: &mut RunGuard<'_>,
        cancel: &CancellationToken,
    ) -> MeshflowResult<AgentExecutionResponse> {
        let audit_trail_id = Uuid::new_v4();

        let team = match self.assemble_team(task_id, task, guard).await? {
            Ok(team) => team,
            Err(missing) => {
                warn!(task_id = %task_id, missing = ?missing, "Team assembly failed");
                let detail = if missing.is_empty() {
                    "no agent types requested".to_string()
                } else {
                    format!("unresolved agent types: {}", missing.join(", "))
                };
                return Ok(AgentExecutionResponse::failed(
                    task_id,
                    audit_trail_id,
                    task.pattern.clone(),
                    format!("Could not assemble a team ({detail})"),
                ));
            }
        };

        self.set_phase(task_id, TaskPhase::Validating);
        let strategy: Arc<dyn CoordinationStrategy> = match self.strategies.get(&task.pattern) {
            Some(strategy) => Arc::clone(strategy),
            None => Arc::new(UnsupportedStrategy::new(task.pattern.name())),
        };

        self.set_phase(task_id, TaskPhase::Executing);
        let invoker = GatedInvoker {
            task_id,
            registry: &self.registry,
            runtime: self.runtime.as_ref(),
            approval: self.approval.as_ref(),
            ethics: &self.ethics,
        };
        let executed = strategy.execute(&invoker, &team, task, cancel).await;

        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(task_id = %task_id, pattern = %task.pattern, error = %e, "Agent task aborted");
                return Ok(AgentExecutionResponse::failed(
                    task_id,
                    audit_trail_id,
                    task.pattern.clone(),
                    e.to_string(),
                ));
            }
        };

        if outcome.success {
            self.record_success(task_id, task, &team).await;
        }

        Ok(AgentExecutionResponse {
            task_id,
            is_success: outcome.success,
            summary: outcome.summary,
            agent_ids_involved: team.iter().map(|m| m.instance_id).collect(),
            audit_trail_id,
            pattern: task.pattern.clone(),
            output: outcome.output,
            results: outcome.results,
            duration_ms: 0,
        })
    }

    /// `Ok(Err(missing))` when some requested type is unknown or inactive.
    async fn assemble_team(
        &self,
        task_id: Uuid,
        task: &AgentTask,
        guard: &mut RunGuard<'_>,
    ) -> MeshflowResult<Result<Vec<TeamMember>, Vec<String>>> {
        if task.required_agent_types.is_empty() {
            return Ok(Err(Vec::new()));
        }

        let mut resolved = Vec::new();
        let mut missing = Vec::new();
        for agent_type in &task.required_agent_types {
            if resolved
                .iter()
                .any(|(d, _): &(AgentDefinition, u64)| &d.agent_type == agent_type)
            {
                continue;
            }
            match self.registry.resolve_active(agent_type) {
                Some(entry) => resolved.push(entry),
                None => missing.push(agent_type.clone()),
            }
        }
        if !missing.is_empty() {
            return Ok(Err(missing));
        }

        let mut team = Vec::with_capacity(resolved.len());
        for (definition, registration_order) in resolved {
            let request = SpawnRequest::new(definition.agent_type.clone()).with_parent(task_id);
            let instance_id = self.runtime.provision_instance(&request).await?;
            guard.instances.push(instance_id);
            team.push(TeamMember {
                definition,
                instance_id,
                registration_order,
            });
        }
        Ok(Ok(team))
    }

    async fn record_success(&self, task_id: Uuid, task: &AgentTask, team: &[TeamMember]) {
        let insight = AgentLearningInsight::new(
            ORCHESTRATOR_AGENT_TYPE,
            SUCCESSFUL_WORKFLOW_INSIGHT,
            serde_json::json!({
                "task_id": task_id,
                "goal": task.goal,
                "pattern": task.pattern.name(),
                "agent_types": team.iter().map(TeamMember::agent_type).collect::<Vec<_>>(),
            }),
            1.0,
        );
        if let Err(e) = self.knowledge.store_learning_insight(insight).await {
            warn!(task_id = %task_id, error = %e, "Failed to store run insight");
        }
    }

    fn set_phase(&self, task_id: Uuid, phase: TaskPhase) {
        if let Some(status) = self.active_tasks.write().get_mut(&task_id) {
            status.phase = phase;
        }
    }

    /// Provision a new instance of a registered, active agent type.
    pub async fn spawn_agent(&self, request: SpawnRequest) -> MeshflowResult<Uuid> {
        if self.registry.resolve_active(&request.agent_type).is_none() {
            return Err(MeshflowError::Validation(format!(
                "Cannot spawn unknown or inactive agent type '{}'",
                request.agent_type
            )));
        }
        let agent_id = self.runtime.provision_instance(&request).await?;
        info!(agent_id = %agent_id, agent_type = %request.agent_type, "Agent spawned");
        Ok(agent_id)
    }

    pub fn set_agent_autonomy(&self, agent_type: &str, level: AutonomyLevel) -> MeshflowResult<()> {
        self.registry.set_autonomy(agent_type, level)?;
        info!(agent_type, autonomy = %level, "Agent autonomy updated");
        Ok(())
    }

    pub fn configure_agent_authority(
        &self,
        agent_type: &str,
        scope: AuthorityScope,
    ) -> MeshflowResult<()> {
        self.registry.configure_authority(agent_type, scope)?;
        info!(agent_type, "Agent authority updated");
        Ok(())
    }

    pub async fn share_learning_insight(&self, insight: AgentLearningInsight) -> MeshflowResult<()> {
        if insight.insight_type.trim().is_empty() {
            return Err(MeshflowError::Validation("insight type must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&insight.confidence_score) {
            return Err(MeshflowError::Validation(format!(
                "confidence score must be within [0, 1], got {}",
                insight.confidence_score
            )));
        }
        self.knowledge.store_learning_insight(insight).await
    }

    /// Status of an in-flight run. `None` once the run has finished.
    pub fn get_task_status(&self, task_id: Uuid) -> Option<ActiveTaskStatus> {
        self.active_tasks.read().get(&task_id).cloned()
    }

    pub fn active_tasks(&self) -> Vec<ActiveTaskStatus> {
        self.active_tasks.read().values().cloned().collect()
    }

    pub fn list_agents(&self) -> Vec<AgentDefinition> {
        self.registry.list()
    }

    pub fn get_agent(&self, agent_type: &str) -> Option<AgentDefinition> {
        self.registry.get(agent_type)
    }

    pub async fn get_relevant_insights(
        &self,
        topic: &str,
    ) -> MeshflowResult<Vec<AgentLearningInsight>> {
        self.knowledge.get_relevant_insights(topic).await
    }
}

/// Owns the bookkeeping of one run: its active-task entry and the instances
/// provisioned for it.
///
/// Dropping the guard removes the entry. Instances still held at that point
/// (the caller dropped the run mid-flight) are released on a spawned task.
struct RunGuard<'a> {
    task_id: Uuid,
    active_tasks: &'a RwLock<HashMap<Uuid, ActiveTaskStatus>>,
    runtime: Arc<dyn AgentRuntime>,
    instances: Vec<Uuid>,
}

impl RunGuard<'_> {
    async fn release_instances(&mut self) {
        // Pop only after release so an interrupted release is retried on drop.
        while let Some(&agent_id) = self.instances.last() {
            self.runtime.release_instance(agent_id).await;
            self.instances.pop();
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active_tasks.write().remove(&self.task_id);
        if self.instances.is_empty() {
            return;
        }

        let instances = std::mem::take(&mut self.instances);
        warn!(
            task_id = %self.task_id,
            instances = instances.len(),
            "Agent task dropped before cleanup; releasing instances"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = Arc::clone(&self.runtime);
                handle.spawn(async move {
                    for agent_id in instances {
                        runtime.release_instance(agent_id).await;
                    }
                });
            }
            Err(_) => warn!(
                task_id = %self.task_id,
                "No async runtime available; abandoned instances were not released"
            ),
        }
    }
}

/// Applies the ethics, authority and autonomy gates before running an
/// agent's logic.
struct GatedInvoker<'a> {
    task_id: Uuid,
    registry: &'a AgentRegistry,
    runtime: &'a dyn AgentRuntime,
    approval: &'a dyn ApprovalPort,
    ethics: &'a EthicsGate,
}

impl<'a> GatedInvoker<'a> {
    async fn approve(
        &self,
        member: &TeamMember,
        policy: &EffectivePolicy,
        task: &AgentTask,
    ) -> MeshflowResult<Option<String>> {
        if !policy.autonomy.requires_approval() {
            return Ok(None);
        }
        let payload = serde_json::json!({
            "task_id": self.task_id,
            "agent_type": member.agent_type(),
            "autonomy": policy.autonomy,
            "goal": task.goal,
        });
        let description = format!("{} acting on '{}'", member.agent_type(), task.goal);
        match self
            .approval
            .request_approval(&member.instance_id.to_string(), &description, &payload)
            .await
        {
            Ok(true) => Ok(None),
            Ok(false) => Ok(Some("Approval denied".to_string())),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Ok(Some(format!("Approval unavailable: {e}"))),
        }
    }
}

#[async_trait]
impl<'a> MemberInvoker for GatedInvoker<'a> {
    async fn invoke(
        &self,
        member: &TeamMember,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<AgentActionResult> {
        if cancel.is_cancelled() {
            return Err(MeshflowError::Cancelled);
        }
        let agent_id = member.instance_id;
        let agent_type = member.agent_type();

        let verdict = self.ethics.evaluate(agent_id, agent_type, task).await;
        let ethics_unavailable = matches!(verdict, EthicsVerdict::EngineUnavailable(_));

        let policy = self
            .registry
            .effective_policy(agent_type)
            .unwrap_or_else(|| EffectivePolicy {
                autonomy: member.definition.default_autonomy_level,
                authority: member.definition.default_authority_scope.clone(),
            });

        let rejection = match verdict {
            EthicsVerdict::Violation(violations) => {
                Some(format!("Ethics violation: {}", violations.join("; ")))
            }
            _ => match policy.permits(task) {
                Err(reason) => Some(format!("Authority check failed: {reason}")),
                Ok(()) => self.approve(member, &policy, task).await?,
            },
        };

        let outcome = match rejection {
            Some(reason) => ActionOutcome::Rejected { reason },
            None => {
                let executed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(MeshflowError::Cancelled),
                    r = self.runtime.execute_agent_logic(agent_id, task) => r,
                };
                match executed {
                    Ok(out) => ActionOutcome::Completed {
                        output: out.output,
                        confidence: out.confidence,
                    },
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => ActionOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
        };

        let label = match &outcome {
            ActionOutcome::Completed { .. } => "completed",
            ActionOutcome::Rejected { .. } => "rejected",
            ActionOutcome::Failed { .. } => "failed",
        };
        info!(
            task_id = %self.task_id,
            agent_id = %agent_id,
            agent_type,
            autonomy = %policy.autonomy,
            ethics_unavailable,
            outcome = label,
            "Agent action"
        );

        Ok(AgentActionResult {
            agent_id,
            agent_type: agent_type.to_string(),
            outcome,
            ethics_unavailable,
        })
    }
}
