use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Status recorded for a step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointStatus::Pending => write!(f, "pending"),
            CheckpointStatus::Running => write!(f, "running"),
            CheckpointStatus::Completed => write!(f, "completed"),
            CheckpointStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable record that a workflow step reached a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    pub checkpoint_id: Uuid,
    pub workflow_id: String,
    pub step_number: u32,
    pub step_name: String,
    pub status: CheckpointStatus,
    /// Serialized state updates produced by the step (a JSON object).
    pub state_json: String,
    pub created_at: DateTime<Utc>,
}

impl ExecutionCheckpoint {
    pub fn new(
        workflow_id: impl Into<String>,
        step_number: u32,
        step_name: impl Into<String>,
        status: CheckpointStatus,
        state_json: impl Into<String>,
    ) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            step_number,
            step_name: step_name.into(),
            status,
            state_json: state_json.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }

    /// Order used for "latest checkpoint": step number first, then creation time.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.step_number
            .cmp(&other.step_number)
            .then_with(|| self.created_at.cmp(&other.created_at))
    }

    /// Parse `state_json` back into a value. Empty state reads as `null`.
    pub fn state(&self) -> serde_json::Result<serde_json::Value> {
        if self.state_json.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&self.state_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recency_prefers_higher_step() {
        let a = ExecutionCheckpoint::new("wf", 2, "b", CheckpointStatus::Completed, "{}");
        let mut b = ExecutionCheckpoint::new("wf", 1, "a", CheckpointStatus::Completed, "{}");
        b.created_at = a.created_at + Duration::seconds(10);
        assert_eq!(a.recency_cmp(&b), Ordering::Greater);
    }

    #[test]
    fn test_recency_tie_broken_by_time() {
        let a = ExecutionCheckpoint::new("wf", 3, "c", CheckpointStatus::Failed, "{}");
        let mut b = ExecutionCheckpoint::new("wf", 3, "c", CheckpointStatus::Completed, "{}");
        b.created_at = a.created_at + Duration::milliseconds(5);
        assert_eq!(b.recency_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_state_parsing() {
        let cp = ExecutionCheckpoint::new(
            "wf",
            1,
            "load",
            CheckpointStatus::Completed,
            r#"{"rows": 42}"#,
        );
        assert_eq!(cp.state().unwrap()["rows"], 42);

        let empty = ExecutionCheckpoint::new("wf", 1, "load", CheckpointStatus::Failed, "");
        assert!(empty.state().unwrap().is_null());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&CheckpointStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
