//! Built-in templates and agents used by the `templates` and `swarm-demo`
//! commands.

use meshflow_core::{AgentDefinition, AutonomyLevel, MeshflowResult};
use meshflow_orchestrator::{AgentOutput, AgentTask, InProcessAgentRuntime, OrchestrationEngine};
use meshflow_workflow::{
    TemplateParameters, TemplateRegistry, WorkflowDefinition, WorkflowStepResult,
    WorkflowTemplate,
};
use serde_json::Value;

fn param(params: &TemplateParameters, key: &str, fallback: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

/// Register the demo templates with `max_retry` retries per step.
pub fn register_templates(registry: &TemplateRegistry, max_retry: u32) {
    registry.register_template(
        WorkflowTemplate::new("nightly-report", "Nightly report", move |params| {
            let dataset = param(params, "dataset", "sales");
            Ok(WorkflowDefinition::new(format!("nightly-report-{dataset}"))
                .with_max_retry(max_retry)
                .then("gather", move |_, _| {
                    let dataset = dataset.clone();
                    async move {
                        Ok(WorkflowStepResult::ok()
                            .with_state("dataset", dataset.into())
                            .with_state("rows", 1280.into()))
                    }
                })
                .then("summarize", |ctx, _| async move {
                    let rows = ctx.previous_state["rows"].as_u64().unwrap_or(0);
                    Ok(WorkflowStepResult::ok()
                        .with_state("summary", format!("{rows} rows processed").into()))
                })
                .then("publish", |ctx, _| async move {
                    let summary = ctx.previous_state["summary"].clone();
                    Ok(WorkflowStepResult::ok()
                        .with_state("published", true.into())
                        .with_state("summary", summary))
                }))
        })
        .approved_by("ops-lead"),
    );

    registry.register_template(WorkflowTemplate::new(
        "data-cleanup",
        "Ad-hoc data cleanup",
        move |params| {
            let table = param(params, "table", "staging");
            Ok(WorkflowDefinition::new(format!("data-cleanup-{table}"))
                .with_max_retry(max_retry)
                .then("scan", |_, _| async {
                    Ok(WorkflowStepResult::ok().with_state("candidates", 42.into()))
                })
                .then("purge", move |_, _| {
                    let table = table.clone();
                    async move {
                        Ok(WorkflowStepResult::ok().with_state("purged_from", table.into()))
                    }
                }))
        },
    ));
}

/// Two-agent swarm: a drafter that refines the previous output and an
/// editor that signs off once the draft has gone through `rounds` rounds.
pub async fn register_swarm_agents(
    engine: &OrchestrationEngine,
    runtime: &InProcessAgentRuntime,
    sentinel: &str,
) -> MeshflowResult<()> {
    runtime.register_handler("drafter", |task: AgentTask| async move {
        let iteration = task.context.get("swarm_iteration").and_then(Value::as_u64).unwrap_or(0);
        Ok(AgentOutput::new(format!("draft v{iteration} of '{}'", task.goal)).with_confidence(0.6))
    });

    let sentinel = sentinel.to_string();
    runtime.register_handler("editor", move |task: AgentTask| {
        let sentinel = sentinel.clone();
        async move {
            let iteration = task.context.get("swarm_iteration").and_then(Value::as_u64).unwrap_or(0);
            let rounds = task.context.get("rounds").and_then(Value::as_u64).unwrap_or(3);
            let previous = task
                .context
                .get("previous_output")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if iteration >= rounds {
                Ok(AgentOutput::new(format!("{sentinel} {previous}")).with_confidence(0.95))
            } else {
                Ok(AgentOutput::new(format!("notes on {previous}")).with_confidence(0.5))
            }
        }
    });

    for (agent_type, description) in [
        ("drafter", "Writes and refines drafts"),
        ("editor", "Reviews drafts and signs off"),
    ] {
        engine
            .register_agent(
                AgentDefinition::new(agent_type, description)
                    .with_autonomy(AutonomyLevel::FullyAutonomous),
            )
            .await?;
    }
    Ok(())
}
