//! One [`CoordinationStrategy`] per coordination pattern.
//!
//! Strategies never call the runtime directly. They go through a
//! [`MemberInvoker`], which applies the ethics, authority and autonomy gates
//! to every agent action, so a gated rejection is just another
//! [`AgentActionResult`] from a strategy's point of view.

use crate::types::{AgentActionResult, AgentTask, TeamMember};
use async_trait::async_trait;
use futures_util::future::join_all;
use meshflow_core::{MeshflowError, MeshflowResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs one team member's action through the gates and the runtime.
///
/// Returns `Err` only for cancellation or infrastructure failures; agent
/// failures and rejections are reported in the result.
#[async_trait]
pub trait MemberInvoker: Send + Sync {
    async fn invoke(
        &self,
        member: &TeamMember,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<AgentActionResult>;
}

/// What a strategy hands back to the engine.
#[derive(Debug, Clone, Default)]
pub struct PatternOutcome {
    pub success: bool,
    pub summary: String,
    pub output: Option<String>,
    pub results: Vec<AgentActionResult>,
}

#[async_trait]
pub trait CoordinationStrategy: Send + Sync {
    /// Pattern name this strategy is registered under.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        invoker: &dyn MemberInvoker,
        team: &[TeamMember],
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome>;
}

fn count_outcomes(results: &[AgentActionResult]) -> (usize, usize, usize) {
    let completed = results.iter().filter(|r| r.is_completed()).count();
    let rejected = results.iter().filter(|r| r.is_rejected()).count();
    (completed, rejected, results.len() - completed - rejected)
}

/// Every member runs concurrently; the run succeeds when no agent logic
/// failed. Gated rejections do not fail the run.
#[derive(Debug, Default, Clone)]
pub struct ParallelStrategy {
    limit: Option<usize>,
}

impl ParallelStrategy {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl CoordinationStrategy for ParallelStrategy {
    fn name(&self) -> &str {
        "parallel"
    }

    async fn execute(
        &self,
        invoker: &dyn MemberInvoker,
        team: &[TeamMember],
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome> {
        let semaphore = self.limit.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let invocations = team.iter().map(|member| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore {
                    Some(s) => match s.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return Err(MeshflowError::Cancelled),
                    },
                    None => None,
                };
                invoker.invoke(member, task, cancel).await
            }
        });

        let results = join_all(invocations)
            .await
            .into_iter()
            .collect::<MeshflowResult<Vec<_>>>()?;

        let (completed, rejected, failed) = count_outcomes(&results);
        let output = results
            .iter()
            .filter_map(|r| r.output().map(|o| format!("[{}] {o}", r.agent_type)))
            .collect::<Vec<_>>();

        Ok(PatternOutcome {
            success: failed == 0,
            summary: format!(
                "Parallel execution finished: {completed} completed, {rejected} rejected, {failed} failed"
            ),
            output: (!output.is_empty()).then(|| output.join("\n")),
            results,
        })
    }
}

/// Context key naming the lead agent type for the hierarchical pattern.
pub const LEAD_AGENT_KEY: &str = "lead_agent_type";

/// The lead acts first and its result is authoritative. Subordinates only
/// run once the lead has completed and see its output as `lead_output`.
#[derive(Debug, Default, Clone)]
pub struct HierarchicalStrategy;

#[async_trait]
impl CoordinationStrategy for HierarchicalStrategy {
    fn name(&self) -> &str {
        "hierarchical"
    }

    async fn execute(
        &self,
        invoker: &dyn MemberInvoker,
        team: &[TeamMember],
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome> {
        let lead_index = task
            .context
            .get(LEAD_AGENT_KEY)
            .and_then(|v| v.as_str())
            .and_then(|lead| team.iter().position(|m| m.agent_type() == lead))
            .unwrap_or(0);
        let Some(lead) = team.get(lead_index) else {
            return Err(MeshflowError::Validation("hierarchical team is empty".into()));
        };

        info!(lead = lead.agent_type(), subordinates = team.len() - 1, "Lead agent acting");
        let lead_result = invoker.invoke(lead, task, cancel).await?;
        let lead_output = lead_result.output().map(str::to_string);
        let mut results = vec![lead_result];

        let Some(lead_output) = lead_output else {
            return Ok(PatternOutcome {
                success: false,
                summary: format!("Lead agent '{}' did not complete", lead.agent_type()),
                output: None,
                results,
            });
        };

        let delegated = task
            .clone()
            .with_context("lead_output", lead_output.clone().into());
        for (i, member) in team.iter().enumerate() {
            if i == lead_index {
                continue;
            }
            results.push(invoker.invoke(member, &delegated, cancel).await?);
        }

        let (completed, rejected, failed) = count_outcomes(&results[1..]);
        Ok(PatternOutcome {
            success: true,
            summary: format!(
                "Lead agent '{}' completed; subordinates: {completed} completed, {rejected} rejected, {failed} failed",
                lead.agent_type()
            ),
            output: Some(lead_output),
            results,
        })
    }
}

/// Chooses the winning candidate of a competitive run.
pub trait CandidateScorer: Send + Sync {
    /// `candidates` are ordered by agent registration. Only completed
    /// results are eligible.
    fn select<'a>(&self, candidates: &'a [AgentActionResult]) -> Option<&'a AgentActionResult>;
}

/// Highest reported confidence; the earliest registered agent wins ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct HighestConfidence;

impl CandidateScorer for HighestConfidence {
    fn select<'a>(&self, candidates: &'a [AgentActionResult]) -> Option<&'a AgentActionResult> {
        let mut best: Option<(&AgentActionResult, f64)> = None;
        for candidate in candidates {
            let Some(confidence) = candidate.confidence() else {
                continue;
            };
            match best {
                Some((_, top)) if confidence <= top => {}
                _ => best = Some((candidate, confidence)),
            }
        }
        best.map(|(c, _)| c)
    }
}

/// Every member produces a candidate; the scorer picks the run's output.
pub struct CompetitiveStrategy {
    scorer: Arc<dyn CandidateScorer>,
}

impl CompetitiveStrategy {
    pub fn new(scorer: Arc<dyn CandidateScorer>) -> Self {
        Self { scorer }
    }
}

impl Default for CompetitiveStrategy {
    fn default() -> Self {
        Self::new(Arc::new(HighestConfidence))
    }
}

#[async_trait]
impl CoordinationStrategy for CompetitiveStrategy {
    fn name(&self) -> &str {
        "competitive"
    }

    async fn execute(
        &self,
        invoker: &dyn MemberInvoker,
        team: &[TeamMember],
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome> {
        let mut contenders: Vec<&TeamMember> = team.iter().collect();
        contenders.sort_by_key(|m| m.registration_order);

        let mut results = Vec::with_capacity(contenders.len());
        for member in contenders {
            results.push(invoker.invoke(member, task, cancel).await?);
        }

        let winner = self
            .scorer
            .select(&results)
            .map(|w| (w.agent_type.clone(), w.output().map(str::to_string), w.confidence()));

        Ok(match winner {
            Some((agent_type, output, confidence)) => PatternOutcome {
                success: true,
                summary: format!(
                    "Competitive selection: '{agent_type}' won with confidence {:.2} out of {} candidates",
                    confidence.unwrap_or_default(),
                    results.len()
                ),
                output,
                results,
            },
            None => PatternOutcome {
                success: false,
                summary: "Competitive selection: no agent produced a candidate".to_string(),
                output: None,
                results,
            },
        })
    }
}

/// When a collaborative swarm is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    /// Output prefix that signals convergence.
    pub sentinel: String,
    /// Maximum number of rounds. Each round invokes every member once.
    pub max_iterations: u32,
}

impl ConvergencePolicy {
    pub fn new(sentinel: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            sentinel: sentinel.into(),
            max_iterations,
        }
    }

    pub fn is_converged(&self, output: &str) -> bool {
        output.trim_start().starts_with(&self.sentinel)
    }
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self::new("FINAL:", 1000)
    }
}

/// Members take turns refining a shared draft until one output starts with
/// the sentinel or the round cap is hit. A round in which no member produces
/// output does not end the run.
///
/// Each invocation sees `swarm_iteration` and the latest `previous_output`
/// in its task context.
#[derive(Debug, Default, Clone)]
pub struct CollaborativeSwarmStrategy {
    policy: ConvergencePolicy,
}

impl CollaborativeSwarmStrategy {
    pub fn new(policy: ConvergencePolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl CoordinationStrategy for CollaborativeSwarmStrategy {
    fn name(&self) -> &str {
        "collaborative_swarm"
    }

    async fn execute(
        &self,
        invoker: &dyn MemberInvoker,
        team: &[TeamMember],
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome> {
        let mut previous_output: Option<String> = None;
        let mut round_results = Vec::new();

        for iteration in 1..=self.policy.max_iterations {
            if cancel.is_cancelled() {
                return Err(MeshflowError::Cancelled);
            }
            round_results.clear();

            for member in team {
                let mut turn = task
                    .clone()
                    .with_context("swarm_iteration", iteration.into());
                if let Some(previous) = &previous_output {
                    turn = turn.with_context("previous_output", previous.clone().into());
                }

                let result = invoker.invoke(member, &turn, cancel).await?;
                let output = result.output().map(str::to_string);
                round_results.push(result);

                if let Some(output) = output {
                    if self.policy.is_converged(&output) {
                        info!(iteration, agent_type = member.agent_type(), "Swarm converged");
                        return Ok(PatternOutcome {
                            success: true,
                            summary: format!(
                                "Swarm converged after {iteration} round(s) on '{}'",
                                member.agent_type()
                            ),
                            output: Some(output),
                            results: round_results,
                        });
                    }
                    previous_output = Some(output);
                }
            }

            debug!(iteration, "Swarm round finished without convergence");
        }

        Ok(PatternOutcome {
            success: false,
            summary: format!(
                "Swarm did not converge within {} rounds",
                self.policy.max_iterations
            ),
            output: previous_output,
            results: round_results,
        })
    }
}

/// Fallback for pattern names without a registered strategy.
#[derive(Debug, Clone)]
pub struct UnsupportedStrategy {
    pattern: String,
}

impl UnsupportedStrategy {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

#[async_trait]
impl CoordinationStrategy for UnsupportedStrategy {
    fn name(&self) -> &str {
        &self.pattern
    }

    async fn execute(
        &self,
        _invoker: &dyn MemberInvoker,
        _team: &[TeamMember],
        _task: &AgentTask,
        _cancel: &CancellationToken,
    ) -> MeshflowResult<PatternOutcome> {
        Err(MeshflowError::UnsupportedPattern(self.pattern.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionOutcome;
    use meshflow_core::AgentDefinition;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Scripted invoker: each agent type returns a queue of outcomes, the
    /// last one repeating.
    struct Scripted {
        script: HashMap<String, Vec<ActionOutcome>>,
        calls: Mutex<Vec<(String, AgentTask)>>,
    }

    impl Scripted {
        fn new(entries: Vec<(&str, Vec<ActionOutcome>)>) -> Self {
            Self {
                script: entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, agent_type: &str) -> usize {
            self.calls.lock().iter().filter(|(t, _)| t == agent_type).count()
        }
    }

    #[async_trait]
    impl MemberInvoker for Scripted {
        async fn invoke(
            &self,
            member: &TeamMember,
            task: &AgentTask,
            cancel: &CancellationToken,
        ) -> MeshflowResult<AgentActionResult> {
            if cancel.is_cancelled() {
                return Err(MeshflowError::Cancelled);
            }
            let n = self.calls_for(member.agent_type());
            self.calls
                .lock()
                .push((member.agent_type().to_string(), task.clone()));
            let outcomes = &self.script[member.agent_type()];
            let outcome = outcomes[n.min(outcomes.len() - 1)].clone();
            Ok(AgentActionResult {
                agent_id: member.instance_id,
                agent_type: member.agent_type().to_string(),
                outcome,
                ethics_unavailable: false,
            })
        }
    }

    fn done(output: &str, confidence: f64) -> ActionOutcome {
        ActionOutcome::Completed {
            output: output.into(),
            confidence,
        }
    }

    fn member(agent_type: &str, order: u64) -> TeamMember {
        TeamMember {
            definition: AgentDefinition::new(agent_type, agent_type),
            instance_id: Uuid::new_v4(),
            registration_order: order,
        }
    }

    #[tokio::test]
    async fn test_parallel_rejection_is_not_failure() {
        let invoker = Scripted::new(vec![
            ("a", vec![done("alpha", 1.0)]),
            ("b", vec![ActionOutcome::Rejected { reason: "denied".into() }]),
        ]);
        let team = vec![member("a", 0), member("b", 1)];
        let outcome = ParallelStrategy::new(Some(1))
            .execute(&invoker, &team, &AgentTask::new("g", "parallel"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.summary.contains("1 completed, 1 rejected, 0 failed"));
    }

    #[tokio::test]
    async fn test_parallel_agent_failure_fails_run() {
        let invoker = Scripted::new(vec![
            ("a", vec![done("alpha", 1.0)]),
            ("b", vec![ActionOutcome::Failed { error: "boom".into() }]),
        ]);
        let team = vec![member("a", 0), member("b", 1)];
        let outcome = ParallelStrategy::default()
            .execute(&invoker, &team, &AgentTask::new("g", "parallel"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_hierarchical_follows_lead() {
        let invoker = Scripted::new(vec![
            ("worker", vec![ActionOutcome::Failed { error: "tired".into() }]),
            ("manager", vec![done("plan", 0.9)]),
        ]);
        let team = vec![member("worker", 0), member("manager", 1)];
        let task = AgentTask::new("g", "hierarchical")
            .with_context(LEAD_AGENT_KEY, serde_json::json!("manager"));
        let outcome = HierarchicalStrategy
            .execute(&invoker, &team, &task, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("plan"));
        assert_eq!(outcome.results[0].agent_type, "manager");

        let calls = invoker.calls.lock();
        let worker_task = &calls.iter().find(|(t, _)| t == "worker").unwrap().1;
        assert_eq!(worker_task.context["lead_output"], "plan");
    }

    #[tokio::test]
    async fn test_hierarchical_lead_failure_skips_subordinates() {
        let invoker = Scripted::new(vec![
            ("lead", vec![ActionOutcome::Rejected { reason: "no".into() }]),
            ("sub", vec![done("x", 1.0)]),
        ]);
        let team = vec![member("lead", 0), member("sub", 1)];
        let outcome = HierarchicalStrategy
            .execute(&invoker, &team, &AgentTask::new("g", "hierarchical"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(invoker.calls_for("sub"), 0);
    }

    #[tokio::test]
    async fn test_competitive_highest_confidence_with_tie_break() {
        let invoker = Scripted::new(vec![
            ("late", vec![done("late answer", 0.8)]),
            ("early", vec![done("early answer", 0.8)]),
            ("weak", vec![done("weak answer", 0.3)]),
        ]);
        // Team order differs from registration order.
        let team = vec![member("late", 5), member("weak", 1), member("early", 2)];
        let outcome = CompetitiveStrategy::default()
            .execute(&invoker, &team, &AgentTask::new("g", "competitive"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("early answer"));
        assert_eq!(outcome.results.len(), 3);
    }

    #[tokio::test]
    async fn test_competitive_without_candidates_fails() {
        let invoker = Scripted::new(vec![(
            "a",
            vec![ActionOutcome::Failed { error: "x".into() }],
        )]);
        let outcome = CompetitiveStrategy::default()
            .execute(&invoker, &[member("a", 0)], &AgentTask::new("g", "competitive"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_swarm_converges_on_sentinel() {
        let invoker = Scripted::new(vec![(
            "thinker",
            vec![
                done("draft 1", 0.5),
                done("draft 2", 0.6),
                done("FINAL: answer", 0.9),
            ],
        )]);
        let outcome = CollaborativeSwarmStrategy::default()
            .execute(&invoker, &[member("thinker", 0)], &AgentTask::new("g", "swarm"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("FINAL: answer"));
        assert!(outcome.summary.contains("3 round(s)"));

        let calls = invoker.calls.lock();
        assert_eq!(calls[2].1.context["previous_output"], "draft 2");
        assert_eq!(calls[2].1.context["swarm_iteration"], 3);
    }

    #[tokio::test]
    async fn test_swarm_respects_iteration_cap() {
        let invoker = Scripted::new(vec![("thinker", vec![done("still thinking", 0.5)])]);
        let strategy = CollaborativeSwarmStrategy::new(ConvergencePolicy::new("DONE", 4));
        let outcome = strategy
            .execute(&invoker, &[member("thinker", 0)], &AgentTask::new("g", "swarm"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(invoker.calls_for("thinker"), 4);
        assert!(outcome.summary.contains("within 4 rounds"));
    }

    #[tokio::test]
    async fn test_swarm_recovers_after_failed_round() {
        let invoker = Scripted::new(vec![(
            "thinker",
            vec![
                ActionOutcome::Failed { error: "transient".into() },
                done("FINAL: answer", 0.8),
            ],
        )]);
        let outcome = CollaborativeSwarmStrategy::default()
            .execute(&invoker, &[member("thinker", 0)], &AgentTask::new("g", "swarm"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("FINAL: answer"));
        assert_eq!(invoker.calls_for("thinker"), 2);
        assert!(outcome.summary.contains("2 round(s)"));
    }

    #[tokio::test]
    async fn test_swarm_rejected_rounds_run_to_cap() {
        let invoker = Scripted::new(vec![(
            "thinker",
            vec![ActionOutcome::Rejected { reason: "denied".into() }],
        )]);
        let strategy = CollaborativeSwarmStrategy::new(ConvergencePolicy::new("FINAL:", 5));
        let outcome = strategy
            .execute(&invoker, &[member("thinker", 0)], &AgentTask::new("g", "swarm"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(invoker.calls_for("thinker"), 5);
        assert!(outcome.summary.contains("within 5 rounds"));
    }

    #[tokio::test]
    async fn test_unsupported_strategy_errors() {
        let invoker = Scripted::new(Vec::new());
        let err = UnsupportedStrategy::new("auction")
            .execute(&invoker, &[], &AgentTask::new("g", "auction"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let invoker = Scripted::new(vec![("a", vec![done("x", 1.0)])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ParallelStrategy::default()
            .execute(&invoker, &[member("a", 0)], &AgentTask::new("g", "parallel"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
