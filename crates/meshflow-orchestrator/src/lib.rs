//! Multi-agent orchestration: team assembly, governance gates, and
//! coordination patterns over an in-process agent runtime.
//!
//! A run takes an [`AgentTask`], assembles a team from the [`AgentRegistry`],
//! passes every agent action through the ethics, authority and autonomy
//! gates, and hands the team to the [`CoordinationStrategy`] selected by the
//! task's [`CoordinationPattern`].
//!
//! # Main types
//!
//! - [`OrchestrationEngine`]: Runs agent tasks and owns the agent registry.
//! - [`AgentRuntime`]: Provisions agent instances and executes their logic.
//! - [`TaskRouter`]: Dispatches a request to the workflow engine or the orchestrator.
//! - [`AgentRegistry`]: Agent definitions plus the effective-policy cache.

/// Engine configuration.
pub mod config;
/// Normative and dignity checks around every agent action.
pub mod ethics;
/// The orchestration engine.
pub mod engine;
/// In-memory knowledge repository.
pub mod knowledge;
/// Agent registry and effective-policy cache.
pub mod registry;
/// Request routing between the workflow engine and the orchestrator.
pub mod router;
/// Agent runtime adapter.
pub mod runtime;
/// Coordination strategies, one per pattern.
pub mod strategy;
/// Shared orchestration types.
pub mod types;

pub use config::OrchestrationConfig;
pub use engine::OrchestrationEngine;
pub use ethics::{EthicsGate, EthicsVerdict};
pub use knowledge::InMemoryKnowledgeRepository;
pub use registry::{AgentRegistry, EffectivePolicy, InvalidationListener};
pub use router::{RouteOutcome, RouteResult, RouteTarget, TaskRequest, TaskRouter};
pub use runtime::{AgentHandler, AgentOutput, AgentRuntime, InProcessAgentRuntime};
pub use strategy::{
    CandidateScorer, CollaborativeSwarmStrategy, CompetitiveStrategy, ConvergencePolicy,
    CoordinationStrategy, HierarchicalStrategy, HighestConfidence, MemberInvoker,
    ParallelStrategy, PatternOutcome, UnsupportedStrategy,
};
pub use types::{
    ActionOutcome, ActiveTaskStatus, AgentActionResult, AgentExecutionResponse, AgentTask,
    CoordinationPattern, SpawnRequest, TaskPhase, TeamMember,
};
