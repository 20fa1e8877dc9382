mod config;
mod demo;

use crate::config::MeshflowConfig;
use clap::{Parser, Subcommand};
use meshflow_checkpoint::{CheckpointBackend, CheckpointStore};
use meshflow_core::AutoApprove;
use meshflow_orchestrator::{
    AgentTask, CoordinationPattern, InMemoryKnowledgeRepository, InProcessAgentRuntime,
    OrchestrationEngine, TaskRequest, TaskRouter,
};
use meshflow_workflow::{HanoiBenchmark, TemplateParameters, TemplateRegistry, WorkflowEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meshflow", about = "Checkpointed workflows and multi-agent orchestration")]
struct Cli {
    /// Path to config file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "meshflow.toml")]
    config: PathBuf,

    /// Human-readable log lines instead of JSON
    #[arg(long)]
    plain_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Tower-of-Hanoi benchmark for one disc count
    Hanoi {
        #[arg(short, long, default_value_t = 10)]
        discs: u32,
    },
    /// Run the benchmark for 1..=max-discs, stopping at the first failure
    Progressive {
        #[arg(long, default_value_t = 12)]
        max_discs: u32,
    },
    /// List the built-in workflow templates
    Templates {
        /// Run this template through the task router
        #[arg(long)]
        run: Option<String>,
        /// Template parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Run a collaborative-swarm demo through the task router
    SwarmDemo {
        #[arg(long, default_value = "release notes")]
        goal: String,
        /// Rounds before the editor signs off
        #[arg(long, default_value_t = 3)]
        rounds: u32,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn init_tracing(plain: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if plain {
        builder.init();
    } else {
        builder.json().init();
    }
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

struct Services {
    router: TaskRouter,
    templates: Arc<TemplateRegistry>,
    orchestrator: Arc<OrchestrationEngine>,
    agents: Arc<InProcessAgentRuntime>,
}

fn build_services(config: &MeshflowConfig, store: Arc<dyn CheckpointStore>) -> Services {
    let workflows = Arc::new(
        WorkflowEngine::from_config(store, &config.workflow).with_approval(Arc::new(AutoApprove)),
    );
    let templates = Arc::new(TemplateRegistry::new());
    demo::register_templates(&templates, config.workflow.default_max_retry_per_step);

    let agents = Arc::new(InProcessAgentRuntime::new());
    let orchestrator = Arc::new(OrchestrationEngine::with_config(
        agents.clone(),
        Arc::new(AutoApprove),
        Arc::new(InMemoryKnowledgeRepository::new()),
        &config.orchestration,
    ));
    let router = TaskRouter::new(workflows, templates.clone(), orchestrator.clone());
    Services {
        router,
        templates,
        orchestrator,
        agents,
    }
}

async fn hanoi_benchmark(config: &MeshflowConfig) -> anyhow::Result<HanoiBenchmark> {
    let checkpoint = &config.checkpoint;
    if checkpoint.backend == CheckpointBackend::Memory && checkpoint.history_limit.is_none() {
        return Ok(HanoiBenchmark::in_memory());
    }
    Ok(HanoiBenchmark::new(checkpoint.open_store().await?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.plain_logs);

    let config = MeshflowConfig::load(&cli.config).await?;
    info!(config = %cli.config.display(), backend = ?config.checkpoint.backend, "Configuration loaded");
    let cancel = interrupt_token();

    match cli.command {
        Commands::Hanoi { discs } => {
            let bench = hanoi_benchmark(&config).await?;
            let result = bench.run_tower_of_hanoi(discs, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                anyhow::bail!("benchmark failed at {discs} discs");
            }
        }
        Commands::Progressive { max_discs } => {
            let bench = hanoi_benchmark(&config).await?;
            let result = bench.run_progressive_benchmark(max_discs, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            println!("{}", result.summary);
        }
        Commands::Templates { run, params } => {
            let services = build_services(&config, config.checkpoint.open_store().await?);
            match run {
                None => {
                    let templates = services.templates.list();
                    println!("Registered templates:");
                    for t in &templates {
                        let approval = match &t.approved_by {
                            Some(by) => format!("pre-approved by {by}"),
                            None => "requires governance".to_string(),
                        };
                        println!("  {}: {} ({approval})", t.template_id, t.name);
                    }
                    println!("\nTotal: {} template(s)", templates.len());
                }
                Some(template_id) => {
                    let parameters: TemplateParameters = params
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    let outcome = services
                        .router
                        .route_task(
                            TaskRequest::Template {
                                template_id,
                                parameters,
                            },
                            &cancel,
                        )
                        .await?;
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
            }
        }
        Commands::SwarmDemo { goal, rounds } => {
            let services = build_services(&config, config.checkpoint.open_store().await?);
            demo::register_swarm_agents(
                &services.orchestrator,
                &services.agents,
                &config.orchestration.swarm_completion_sentinel,
            )
            .await?;

            let task = AgentTask::new(goal, CoordinationPattern::CollaborativeSwarm)
                .with_agents(["drafter", "editor"])
                .with_context("rounds", rounds.into());
            let outcome = services
                .router
                .route_task(TaskRequest::Agents(task), &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
