use crate::types::AgentTask;
use meshflow_core::{
    AgentDefinition, AgentStatus, AuthorityScope, AutonomyLevel, MeshflowError, MeshflowResult,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Called with the agent type whose cached policy was dropped.
pub type InvalidationListener = Arc<dyn Fn(&str) + Send + Sync>;

/// The autonomy and authority an agent actually runs with: its definition's
/// defaults overlaid with any runtime overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub autonomy: AutonomyLevel,
    pub authority: AuthorityScope,
}

impl EffectivePolicy {
    /// Check a task against the authority scope.
    ///
    /// Reads `estimated_cost` (number) and `api_endpoint` (string) from the
    /// task context. Absent keys are not constrained.
    pub fn permits(&self, task: &AgentTask) -> Result<(), String> {
        if let (Some(budget), Some(cost)) = (
            self.authority.max_budget,
            task.context.get("estimated_cost").and_then(|v| v.as_f64()),
        ) {
            if cost > budget {
                return Err(format!("estimated cost {cost} exceeds budget {budget}"));
            }
        }
        if let Some(endpoint) = task.context.get("api_endpoint").and_then(|v| v.as_str()) {
            let allowed = &self.authority.allowed_api_endpoints;
            if !allowed.is_empty() && !allowed.iter().any(|e| e == endpoint) {
                return Err(format!("endpoint '{endpoint}' is outside the authority scope"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct RegisteredAgent {
    definition: AgentDefinition,
    registration_order: u64,
    autonomy_override: Option<AutonomyLevel>,
    authority_override: Option<AuthorityScope>,
}

impl RegisteredAgent {
    fn effective_policy(&self) -> EffectivePolicy {
        EffectivePolicy {
            autonomy: self
                .autonomy_override
                .unwrap_or(self.definition.default_autonomy_level),
            authority: self
                .authority_override
                .clone()
                .unwrap_or_else(|| self.definition.default_authority_scope.clone()),
        }
    }
}

/// Cached effective policies plus a counter bumped on every invalidation.
///
/// A policy computed before an invalidation is never inserted after it.
#[derive(Default)]
struct PolicyCache {
    generation: u64,
    entries: HashMap<String, EffectivePolicy>,
}

/// Agent definitions keyed by agent type, with a cache of effective policies.
///
/// Every mutation that can change a policy drops the affected cache entry and
/// notifies the `on_invalidate` listeners.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, RegisteredAgent>>,
    policy_cache: RwLock<PolicyCache>,
    listeners: RwLock<Vec<InvalidationListener>>,
    next_order: AtomicU64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition. Returns `true` for a new agent type.
    ///
    /// Replacing keeps the original registration order and clears any
    /// runtime overrides.
    pub fn register(&self, definition: AgentDefinition) -> bool {
        let agent_type = definition.agent_type.clone();
        let is_new = {
            let mut agents = self.agents.write();
            match agents.get_mut(&agent_type) {
                Some(existing) => {
                    existing.definition = definition;
                    existing.autonomy_override = None;
                    existing.authority_override = None;
                    false
                }
                None => {
                    let registration_order = self.next_order.fetch_add(1, Ordering::Relaxed);
                    agents.insert(
                        agent_type.clone(),
                        RegisteredAgent {
                            definition,
                            registration_order,
                            autonomy_override: None,
                            authority_override: None,
                        },
                    );
                    true
                }
            }
        };
        self.invalidate(&agent_type);
        is_new
    }

    pub fn get(&self, agent_type: &str) -> Option<AgentDefinition> {
        self.agents
            .read()
            .get(agent_type)
            .map(|a| a.definition.clone())
    }

    /// Definition and registration order of an active agent type.
    pub fn resolve_active(&self, agent_type: &str) -> Option<(AgentDefinition, u64)> {
        self.agents
            .read()
            .get(agent_type)
            .filter(|a| a.definition.status == AgentStatus::Active)
            .map(|a| (a.definition.clone(), a.registration_order))
    }

    /// All definitions in registration order.
    pub fn list(&self) -> Vec<AgentDefinition> {
        let agents = self.agents.read();
        let mut entries: Vec<&RegisteredAgent> = agents.values().collect();
        entries.sort_by_key(|a| a.registration_order);
        entries.into_iter().map(|a| a.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    pub fn set_autonomy(&self, agent_type: &str, level: AutonomyLevel) -> MeshflowResult<()> {
        {
            let mut agents = self.agents.write();
            let agent = agents
                .get_mut(agent_type)
                .ok_or_else(|| unknown_agent(agent_type))?;
            agent.autonomy_override = Some(level);
        }
        self.invalidate(agent_type);
        Ok(())
    }

    pub fn configure_authority(&self, agent_type: &str, scope: AuthorityScope) -> MeshflowResult<()> {
        {
            let mut agents = self.agents.write();
            let agent = agents
                .get_mut(agent_type)
                .ok_or_else(|| unknown_agent(agent_type))?;
            agent.authority_override = Some(scope);
        }
        self.invalidate(agent_type);
        Ok(())
    }

    /// Cached effective policy, computed on first use after an invalidation.
    pub fn effective_policy(&self, agent_type: &str) -> Option<EffectivePolicy> {
        if let Some(policy) = self.policy_cache.read().entries.get(agent_type) {
            return Some(policy.clone());
        }
        let (policy, generation) = self.compute_policy(agent_type)?;
        self.cache_policy(agent_type, &policy, generation);
        Some(policy)
    }

    /// Current policy from the definition and overrides, with the cache
    /// generation observed before reading them.
    fn compute_policy(&self, agent_type: &str) -> Option<(EffectivePolicy, u64)> {
        let generation = self.policy_cache.read().generation;
        let policy = self.agents.read().get(agent_type)?.effective_policy();
        Some((policy, generation))
    }

    /// Insert unless an invalidation happened since `generation` was read.
    fn cache_policy(&self, agent_type: &str, policy: &EffectivePolicy, generation: u64) -> bool {
        let mut cache = self.policy_cache.write();
        if cache.generation != generation {
            return false;
        }
        cache.entries.insert(agent_type.to_string(), policy.clone());
        true
    }

    /// Drop the cached policy for one agent type and notify listeners.
    pub fn invalidate(&self, agent_type: &str) {
        let removed = {
            let mut cache = self.policy_cache.write();
            cache.generation = cache.generation.wrapping_add(1);
            cache.entries.remove(agent_type).is_some()
        };
        debug!(agent_type, cached = removed, "Effective policy invalidated");
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(agent_type);
        }
    }

    pub fn on_invalidate(&self, listener: InvalidationListener) {
        self.listeners.write().push(listener);
    }

    /// Number of cached effective policies.
    pub fn cached_policies(&self) -> usize {
        self.policy_cache.read().entries.len()
    }
}

fn unknown_agent(agent_type: &str) -> MeshflowError {
    MeshflowError::Validation(format!("Unknown agent type '{agent_type}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn definition(agent_type: &str) -> AgentDefinition {
        AgentDefinition::new(agent_type, format!("{agent_type} agent"))
    }

    #[test]
    fn test_register_is_upsert() {
        let registry = AgentRegistry::new();
        assert!(registry.register(definition("writer")));
        assert!(registry.register(definition("reader")));
        assert!(!registry.register(
            definition("writer").with_capabilities(vec!["drafting".into()])
        ));

        assert_eq!(registry.len(), 2);
        let types: Vec<String> = registry.list().into_iter().map(|d| d.agent_type).collect();
        assert_eq!(types, vec!["writer", "reader"]);
        assert_eq!(registry.get("writer").unwrap().capabilities, vec!["drafting"]);
    }

    #[test]
    fn test_effective_policy_uses_overrides() {
        let registry = AgentRegistry::new();
        registry.register(definition("writer").with_autonomy(AutonomyLevel::RecommendOnly));

        let policy = registry.effective_policy("writer").unwrap();
        assert_eq!(policy.autonomy, AutonomyLevel::RecommendOnly);

        registry
            .set_autonomy("writer", AutonomyLevel::FullyAutonomous)
            .unwrap();
        let policy = registry.effective_policy("writer").unwrap();
        assert_eq!(policy.autonomy, AutonomyLevel::FullyAutonomous);

        registry
            .configure_authority("writer", AuthorityScope::default().with_budget(10.0))
            .unwrap();
        let policy = registry.effective_policy("writer").unwrap();
        assert_eq!(policy.authority.max_budget, Some(10.0));
    }

    #[test]
    fn test_reregistration_clears_overrides() {
        let registry = AgentRegistry::new();
        registry.register(definition("writer"));
        registry
            .set_autonomy("writer", AutonomyLevel::FullyAutonomous)
            .unwrap();
        registry.register(definition("writer"));
        assert_eq!(
            registry.effective_policy("writer").unwrap().autonomy,
            AutonomyLevel::ActWithConfirmation
        );
    }

    #[test]
    fn test_cache_invalidation_notifies_listeners() {
        let registry = AgentRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.on_invalidate(Arc::new(move |agent_type: &str| {
            sink.lock().push(agent_type.to_string());
        }));

        registry.register(definition("writer"));
        registry.effective_policy("writer");
        assert_eq!(registry.cached_policies(), 1);

        registry
            .set_autonomy("writer", AutonomyLevel::FullyAutonomous)
            .unwrap();
        assert_eq!(registry.cached_policies(), 0);
        assert_eq!(*seen.lock(), vec!["writer", "writer"]);
    }

    #[test]
    fn test_policy_computed_before_downgrade_is_not_cached() {
        let registry = AgentRegistry::new();
        registry.register(definition("trader").with_autonomy(AutonomyLevel::FullyAutonomous));

        let (stale, generation) = registry.compute_policy("trader").unwrap();
        assert_eq!(stale.autonomy, AutonomyLevel::FullyAutonomous);
        registry
            .set_autonomy("trader", AutonomyLevel::ActWithConfirmation)
            .unwrap();

        assert!(!registry.cache_policy("trader", &stale, generation));
        assert_eq!(registry.cached_policies(), 0);
        assert_eq!(
            registry.effective_policy("trader").unwrap().autonomy,
            AutonomyLevel::ActWithConfirmation
        );
    }

    #[test]
    fn test_concurrent_reads_never_keep_revoked_autonomy() {
        let registry = AgentRegistry::new();
        registry.register(definition("trader"));

        for round in 0..200 {
            let last = if round % 2 == 0 {
                AutonomyLevel::ActWithConfirmation
            } else {
                AutonomyLevel::FullyAutonomous
            };
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for _ in 0..50 {
                        registry.effective_policy("trader");
                    }
                });
                scope.spawn(|| {
                    registry
                        .set_autonomy("trader", AutonomyLevel::FullyAutonomous)
                        .unwrap();
                    registry.set_autonomy("trader", last).unwrap();
                });
            });
            assert_eq!(registry.effective_policy("trader").unwrap().autonomy, last);
        }
    }

    #[test]
    fn test_unknown_agent_override_rejected() {
        let registry = AgentRegistry::new();
        let err = registry
            .set_autonomy("ghost", AutonomyLevel::FullyAutonomous)
            .unwrap_err();
        assert!(matches!(err, MeshflowError::Validation(_)));
        assert!(registry.effective_policy("ghost").is_none());
    }

    #[test]
    fn test_inactive_agents_do_not_resolve() {
        let registry = AgentRegistry::new();
        let mut retired = definition("legacy");
        retired.status = AgentStatus::Retired;
        registry.register(retired);
        assert!(registry.get("legacy").is_some());
        assert!(registry.resolve_active("legacy").is_none());
    }

    #[test]
    fn test_authority_permits() {
        let policy = EffectivePolicy {
            autonomy: AutonomyLevel::FullyAutonomous,
            authority: AuthorityScope::default()
                .with_budget(100.0)
                .with_endpoints(vec!["/reports".into()]),
        };
        let cheap = AgentTask::new("t", "parallel")
            .with_context("estimated_cost", serde_json::json!(20.0))
            .with_context("api_endpoint", serde_json::json!("/reports"));
        assert!(policy.permits(&cheap).is_ok());

        let pricey = AgentTask::new("t", "parallel")
            .with_context("estimated_cost", serde_json::json!(250));
        assert!(policy.permits(&pricey).unwrap_err().contains("exceeds budget"));

        let elsewhere = AgentTask::new("t", "parallel")
            .with_context("api_endpoint", serde_json::json!("/payroll"));
        assert!(policy.permits(&elsewhere).is_err());
    }
}
