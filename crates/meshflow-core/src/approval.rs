//! Approval port for human-in-the-loop gating.
//!
//! Lives in `meshflow-core` so that both the workflow engine (governed steps)
//! and the orchestration engine (confirmation-level agents) can share it.

use crate::MeshflowResult;
use async_trait::async_trait;
use tracing::info;

/// Channel through which approval requests are sent and decisions received.
/// Implementations can be CLI prompts, chat bots, policy engines, etc.
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    /// Ask for approval of `action_description` on behalf of `actor_id`.
    /// `payload` carries the structured context the reviewer needs.
    async fn request_approval(
        &self,
        actor_id: &str,
        action_description: &str,
        payload: &serde_json::Value,
    ) -> MeshflowResult<bool>;
}

/// Auto-approve port for tests and non-interactive environments.
pub struct AutoApprove;

#[async_trait]
impl ApprovalPort for AutoApprove {
    async fn request_approval(
        &self,
        actor_id: &str,
        action_description: &str,
        _payload: &serde_json::Value,
    ) -> MeshflowResult<bool> {
        info!(
            actor = %actor_id,
            action = %action_description,
            "Auto-approving (no human reviewer configured)"
        );
        Ok(true)
    }
}

/// Port that denies every request.
pub struct DenyAll;

#[async_trait]
impl ApprovalPort for DenyAll {
    async fn request_approval(
        &self,
        actor_id: &str,
        action_description: &str,
        _payload: &serde_json::Value,
    ) -> MeshflowResult<bool> {
        info!(actor = %actor_id, action = %action_description, "Denying approval");
        Ok(false)
    }
}
