//! Core types and error definitions for the meshflow execution core.
//!
//! This crate holds what every other meshflow crate shares: the unified error
//! enum and the narrow ports through which the core talks to collaborators it
//! does not own (approval, ethics, knowledge storage).
//!
//! # Main types
//!
//! - [`MeshflowError`]: Unified error enum for all meshflow subsystems.
//! - [`MeshflowResult`]: Convenience alias for `Result<T, MeshflowError>`.
//! - [`ApprovalPort`]: Human/policy approval boundary.
//! - [`NormativeValidator`] / [`DignityAssessor`]: Ethics boundary.
//! - [`KnowledgeRepository`]: Agent definitions and learning insights.

/// Agent definitions, autonomy levels and authority scopes.
pub mod agent;
/// Approval port for gated agent actions and governed workflow steps.
pub mod approval;
/// Normative and informational-dignity ethics ports.
pub mod ethics;
/// Knowledge repository port and learning insights.
pub mod knowledge;

pub use agent::{AgentDefinition, AgentStatus, AuthorityScope, AutonomyLevel};
pub use approval::{ApprovalPort, AutoApprove, DenyAll};
pub use ethics::{
    DignityAssessment, DignityAssessor, DignityRequest, NormativeRequest, NormativeValidator,
    NormativeVerdict,
};
pub use knowledge::{AgentLearningInsight, KnowledgeRepository};

// --- Error types ---

/// Top-level error type for meshflow.
///
/// Only cancellation, argument validation and infrastructure failures travel
/// as errors to callers; step and agent level failures are folded into the
/// structured result objects of the workflow and orchestration engines.
#[derive(Debug, thiserror::Error)]
pub enum MeshflowError {
    /// A malformed request, rejected before any execution.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A workflow step function failed.
    #[error("Step execution error: {0}")]
    StepExecution(String),

    /// No runtime handler is bound to the agent type.
    #[error("No handler registered for agent type '{0}'")]
    HandlerNotFound(String),

    /// The ethics infrastructure could not produce a verdict.
    #[error("Ethics engine unavailable: {0}")]
    EthicsUnavailable(String),

    /// An approval request was denied.
    #[error("Approval denied: {0}")]
    ApprovalDenied(String),

    /// The requested coordination pattern has no strategy.
    #[error("Coordination pattern '{0}' is not supported")]
    UnsupportedPattern(String),

    /// Cancellation was requested through the caller's token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Checkpoint persistence or lookup failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the multi-agent orchestrator.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshflowError {
    /// Whether this error is the distinct cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MeshflowError::Cancelled)
    }
}

/// A convenience `Result` alias using [`MeshflowError`].
pub type MeshflowResult<T> = Result<T, MeshflowError>;
