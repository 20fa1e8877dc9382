//! Durable, checkpointed execution of ordered workflows.
//!
//! A [`WorkflowDefinition`] is a list of steps executed strictly in
//! step-number order by the [`WorkflowEngine`]. Every step that reaches a
//! terminal status leaves an [`ExecutionCheckpoint`](meshflow_checkpoint::ExecutionCheckpoint)
//! behind, so a run interrupted by a crash picks up after the last completed
//! step when it is executed again under the same workflow id.
//!
//! # Main types
//!
//! - [`WorkflowEngine`]: Runs one workflow definition against a checkpoint store.
//! - [`TemplateRegistry`]: Named, pre-approved workflow builders (the governance hot path).
//! - [`HanoiBenchmark`]: Long-horizon correctness benchmark built on Tower-of-Hanoi moves.
//! - [`RetryPolicy`]: Capped exponential backoff between attempts of one step.

/// Tower-of-Hanoi benchmark harness.
pub mod benchmark;
/// Engine configuration.
pub mod config;
/// Workflow and step definitions.
pub mod definition;
/// The sequential workflow engine.
pub mod engine;
/// Retry backoff policy.
pub mod retry;
/// Pre-approved workflow templates.
pub mod template;

pub use benchmark::{
    generate_hanoi_moves, hanoi_move, maker_score, total_moves, BenchmarkResult, HanoiBenchmark,
    HanoiMove, Peg, PegBoard, ProgressiveBenchmarkResult, MAX_HANOI_DISCS,
};
pub use config::WorkflowConfig;
pub use definition::{StepContext, WorkflowDefinition, WorkflowStepDefinition, WorkflowStepResult};
pub use engine::{CheckpointRetention, RunState, WorkflowEngine, WorkflowExecutionResult};
pub use retry::RetryPolicy;
pub use template::{TemplateInfo, TemplateParameters, TemplateRegistry, WorkflowTemplate};
