use crate::types::AgentTask;
use meshflow_core::{DignityAssessor, DignityRequest, NormativeRequest, NormativeValidator};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Task context key whose presence triggers the informational-dignity check.
pub const USER_DATA_KEY: &str = "user_data";

/// Result of running one agent action through the ethics ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthicsVerdict {
    Ok,
    Violation(Vec<String>),
    /// A port errored. The action proceeds.
    EngineUnavailable(String),
}

impl EthicsVerdict {
    pub fn is_violation(&self) -> bool {
        matches!(self, EthicsVerdict::Violation(_))
    }
}

/// Normative validation plus, when the task carries user data, the dignity
/// assessment. Either port may be absent.
#[derive(Default, Clone)]
pub struct EthicsGate {
    normative: Option<Arc<dyn NormativeValidator>>,
    dignity: Option<Arc<dyn DignityAssessor>>,
}

impl EthicsGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normative_validator(mut self, validator: Arc<dyn NormativeValidator>) -> Self {
        self.normative = Some(validator);
        self
    }

    pub fn with_dignity_assessor(mut self, assessor: Arc<dyn DignityAssessor>) -> Self {
        self.dignity = Some(assessor);
        self
    }

    /// Violations from both ports are merged. An unavailable port only wins
    /// when nothing reported a violation.
    pub async fn evaluate(&self, agent_id: Uuid, agent_type: &str, task: &AgentTask) -> EthicsVerdict {
        let mut violations = Vec::new();
        let mut unavailable = None;

        if let Some(validator) = &self.normative {
            let request = NormativeRequest {
                agent_id: agent_id.to_string(),
                agent_type: agent_type.to_string(),
                action: task.goal.clone(),
                context: serde_json::to_value(&task.context).unwrap_or_default(),
            };
            match validator.validate_action(&request).await {
                Ok(verdict) if !verdict.is_valid => violations.extend(verdict.violations),
                Ok(_) => {}
                Err(e) => {
                    warn!(agent_id = %agent_id, agent_type, error = %e, "Normative validation unavailable");
                    unavailable = Some(format!("normative validation: {e}"));
                }
            }
        }

        if let (Some(assessor), Some(user_data)) = (&self.dignity, task.context.get(USER_DATA_KEY)) {
            let request = DignityRequest {
                agent_id: agent_id.to_string(),
                action: task.goal.clone(),
                user_data: user_data.clone(),
            };
            match assessor.assess_informational_dignity(&request).await {
                Ok(assessment) if !assessment.is_dignity_preserved => {
                    violations.extend(assessment.potential_violations)
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(agent_id = %agent_id, agent_type, error = %e, "Dignity assessment unavailable");
                    unavailable.get_or_insert(format!("dignity assessment: {e}"));
                }
            }
        }

        if !violations.is_empty() {
            EthicsVerdict::Violation(violations)
        } else if let Some(reason) = unavailable {
            EthicsVerdict::EngineUnavailable(reason)
        } else {
            EthicsVerdict::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meshflow_core::{
        DignityAssessment, MeshflowError, MeshflowResult, NormativeVerdict,
    };

    struct Verdict(Option<Vec<String>>);

    #[async_trait]
    impl NormativeValidator for Verdict {
        async fn validate_action(&self, _: &NormativeRequest) -> MeshflowResult<NormativeVerdict> {
            match &self.0 {
                Some(v) if v.is_empty() => Ok(NormativeVerdict::valid()),
                Some(v) => Ok(NormativeVerdict::invalid(v.clone())),
                None => Err(MeshflowError::EthicsUnavailable("offline".into())),
            }
        }
    }

    struct RejectsUserData;

    #[async_trait]
    impl DignityAssessor for RejectsUserData {
        async fn assess_informational_dignity(
            &self,
            _: &DignityRequest,
        ) -> MeshflowResult<DignityAssessment> {
            Ok(DignityAssessment {
                is_dignity_preserved: false,
                potential_violations: vec!["profiling".into()],
            })
        }
    }

    fn task() -> AgentTask {
        AgentTask::new("send newsletter", "parallel")
    }

    #[tokio::test]
    async fn test_no_ports_is_ok() {
        let verdict = EthicsGate::new().evaluate(Uuid::new_v4(), "mailer", &task()).await;
        assert_eq!(verdict, EthicsVerdict::Ok);
    }

    #[tokio::test]
    async fn test_normative_violation() {
        let gate = EthicsGate::new()
            .with_normative_validator(Arc::new(Verdict(Some(vec!["spam".into()]))));
        let verdict = gate.evaluate(Uuid::new_v4(), "mailer", &task()).await;
        assert_eq!(verdict, EthicsVerdict::Violation(vec!["spam".into()]));
    }

    #[tokio::test]
    async fn test_unavailable_is_distinct_from_violation() {
        let gate = EthicsGate::new().with_normative_validator(Arc::new(Verdict(None)));
        let verdict = gate.evaluate(Uuid::new_v4(), "mailer", &task()).await;
        assert!(matches!(verdict, EthicsVerdict::EngineUnavailable(_)));
        assert!(!verdict.is_violation());
    }

    #[tokio::test]
    async fn test_dignity_only_with_user_data() {
        let gate = EthicsGate::new()
            .with_normative_validator(Arc::new(Verdict(Some(Vec::new()))))
            .with_dignity_assessor(Arc::new(RejectsUserData));

        let plain = gate.evaluate(Uuid::new_v4(), "mailer", &task()).await;
        assert_eq!(plain, EthicsVerdict::Ok);

        let with_data = task().with_context(USER_DATA_KEY, serde_json::json!({"email": "a@b.c"}));
        let verdict = gate.evaluate(Uuid::new_v4(), "mailer", &with_data).await;
        assert_eq!(verdict, EthicsVerdict::Violation(vec!["profiling".into()]));
    }
}
