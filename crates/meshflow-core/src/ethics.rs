//! Ethics ports: normative validation and informational-dignity assessment.
//!
//! The engines never interpret an `Err` from these ports as a rejection; an
//! error means the ethics infrastructure is unavailable.

#![deny(missing_docs)]

use crate::MeshflowResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An agent action submitted for normative validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormativeRequest {
    /// Instance performing the action.
    pub agent_id: String,
    /// Registered type of that instance.
    pub agent_type: String,
    /// Human-readable description of the action, usually the task goal.
    pub action: String,
    /// Task context at the time of the action.
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Outcome of a normative validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormativeVerdict {
    /// `false` when at least one norm is violated.
    pub is_valid: bool,
    /// Names or descriptions of the violated norms.
    #[serde(default)]
    pub violations: Vec<String>,
}

impl NormativeVerdict {
    /// A verdict with no violations.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
        }
    }

    /// A failing verdict listing `violations`.
    pub fn invalid(violations: Vec<String>) -> Self {
        Self {
            is_valid: false,
            violations,
        }
    }
}

/// A request to assess how an action treats a data subject's information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DignityRequest {
    /// Instance performing the action.
    pub agent_id: String,
    /// Description of the action.
    pub action: String,
    /// The user data found in the task context.
    pub user_data: serde_json::Value,
}

/// Outcome of an informational-dignity assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DignityAssessment {
    /// `false` when the action mistreats the data subject's information.
    pub is_dignity_preserved: bool,
    /// Concerns raised by the assessor, if any.
    #[serde(default)]
    pub potential_violations: Vec<String>,
}

/// Checks an agent action against the configured norms.
#[async_trait]
pub trait NormativeValidator: Send + Sync {
    /// `Err` means the validator could not be reached, not that the action
    /// was refused.
    async fn validate_action(&self, request: &NormativeRequest) -> MeshflowResult<NormativeVerdict>;
}

/// Judges actions that touch user data.
#[async_trait]
pub trait DignityAssessor: Send + Sync {
    /// Assess one action. `Err` means the assessor is unavailable.
    async fn assess_informational_dignity(
        &self,
        request: &DignityRequest,
    ) -> MeshflowResult<DignityAssessment>;
}
