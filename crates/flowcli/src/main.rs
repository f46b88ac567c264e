// crates/flowcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{
    ConfigMap, EventBus, ExecutionEvent, Node, NodeRunStatus, NodeType, Value, Workflow,
    WorkflowSpec, WorkflowStatus,
};
use flowruntime::{ComplianceLevel, EngineConfig, Executor, HandlerRegistry, Validator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON); defaults come from ENGINE_* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as JSON object
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Compliance level: basic, soc2, hipaa or gdpr
        #[arg(long, default_value = "basic")]
        compliance: String,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run { file, input } => {
            let config = load_config(cli.config.as_deref())?;
            run_workflow(&file, input, config).await?;
        }

        Commands::Validate { file, compliance } => {
            validate_workflow(&file, &compliance).await?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::from_env(),
    };
    config.validate()?;
    Ok(config)
}

fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    flownodes::register_all(&mut registry, None);
    registry
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow {}", file.display()))?;
    let spec: WorkflowSpec = serde_json::from_str(&raw)
        .with_context(|| format!("parsing workflow {}", file.display()))?;
    Ok(Workflow::from_spec(spec)?)
}

fn parse_compliance(level: &str) -> Result<ComplianceLevel> {
    Ok(match level.to_ascii_lowercase().as_str() {
        "basic" => ComplianceLevel::Basic,
        "soc2" => ComplianceLevel::Soc2,
        "hipaa" => ComplianceLevel::Hipaa,
        "gdpr" => ComplianceLevel::Gdpr,
        other => bail!("unknown compliance level: {}", other),
    })
}

fn parse_inputs(input: Option<String>) -> Result<ConfigMap> {
    let Some(raw) = input else {
        return Ok(ConfigMap::new());
    };
    match serde_json::from_str::<serde_json::Value>(&raw)? {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect()),
        _ => bail!("Input must be a JSON object"),
    }
}

async fn run_workflow(file: &Path, input: Option<String>, config: EngineConfig) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let workflow = load_workflow(file)?;
    println!("📋 Workflow: {}", workflow.name());
    println!("   Nodes: {}", workflow.node_count());
    println!();

    Validator::new()
        .validate_workflow(&workflow, &ComplianceLevel::Basic)
        .await
        .context("workflow is invalid")?;
    if workflow.status() == WorkflowStatus::Draft {
        workflow.update_status(WorkflowStatus::Active)?;
    }

    let inputs = parse_inputs(input)?;
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let executor = Executor::new(Arc::new(registry()), config).with_hooks(bus.clone());

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { execution_id, .. } => {
                    println!("▶️  Workflow started ({})", execution_id);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeFinished {
                    node_id,
                    status,
                    duration_ms,
                    error,
                    ..
                } => match status {
                    NodeRunStatus::Completed => {
                        println!("  ✅ Node {} completed in {}ms", node_id, duration_ms)
                    }
                    NodeRunStatus::Skipped => println!("  ⏭️  Node {} skipped", node_id),
                    _ => println!(
                        "  ❌ Node {} failed: {}",
                        node_id,
                        error.unwrap_or_default()
                    ),
                },
                ExecutionEvent::WorkflowFinished {
                    status,
                    duration_ms,
                    ..
                } => {
                    println!("🏁 Workflow {} after {}ms", status, duration_ms);
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let workflow_id = workflow.id();
    let result = executor
        .execute_workflow_with_inputs(&cancel, Arc::new(workflow), inputs)
        .await;
    let report = executor.execution_report(workflow_id);
    // closing the bus ends the printer once it has drained
    drop(executor);
    drop(bus);
    let _ = event_task.await;

    if let Some(report) = report {
        println!();
        println!("📊 Execution Summary:");
        println!("{}", serde_json::to_string_pretty(&report.summary())?);

        let with_outputs: Vec<_> = report.nodes.iter().filter(|n| !n.outputs.is_empty()).collect();
        if !with_outputs.is_empty() {
            println!();
            println!("📤 Outputs:");
            for node in with_outputs {
                println!("   Node {} ({}):", node.node_id, node.node_type);
                for (key, value) in &node.outputs {
                    println!("     {}: {}", key, value.to_json());
                }
            }
        }
    }

    result.map(|_| ()).context("workflow execution failed")
}

async fn validate_workflow(file: &Path, compliance: &str) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());
    let level = parse_compliance(compliance)?;
    let workflow = load_workflow(file)?;

    Validator::new()
        .validate_workflow(&workflow, &level)
        .await
        .context("workflow is invalid")?;

    let registry = registry();
    for node in workflow.nodes() {
        registry
            .validate_node_config(&node)
            .with_context(|| format!("node '{}' ({}) is invalid", node.name(), node.id()))?;
    }

    println!("✅ Workflow is valid ({}):", level);
    println!("   Name: {}", workflow.name());
    println!("   Nodes: {}", workflow.node_count());
    if !workflow.has_trigger() {
        println!("   ⚠️  No trigger node: the workflow cannot be activated");
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    for info in registry().list() {
        println!("  • {} (requires '{}')", info.node_type, info.required_config);
        println!("    {}", info.description);
    }
    println!();
    println!(
        "  Action types: {}",
        flownodes::ActionHandler::builtin().action_types().join(", ")
    );
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let workflow = Workflow::new(
        Uuid::new_v4(),
        "Example HTTP Workflow",
        "Fetches data from an API and logs the result",
    )?;

    let node = |node_type: NodeType, name: &str, pairs: &[(&str, Value)]| {
        let config: ConfigMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Node::new(workflow.id(), node_type, name, config)
    };

    let trigger = node(NodeType::Trigger, "Start", &[("trigger_type", Value::from("manual"))])?;
    let fetch = node(
        NodeType::Action,
        "Fetch Data",
        &[
            ("action_type", Value::from("http")),
            ("method", Value::from("GET")),
            ("url", Value::from("https://api.github.com/zen")),
        ],
    )?;
    let check = node(NodeType::Condition, "Succeeded", &[("condition", Value::from("status == 200"))])?;
    let log = node(
        NodeType::Action,
        "Log Response",
        &[("action_type", Value::from("log"))],
    )?;
    fetch.update_position(200, 100)?;
    check.update_position(400, 100)?;
    log.update_position(600, 100)?;

    let ids: Vec<_> = [trigger, fetch, check, log]
        .into_iter()
        .map(|n| workflow.add_node(n).map(|n| n.id()))
        .collect::<Result<_, _>>()?;
    for pair in ids.windows(2) {
        workflow.connect(pair[0], pair[1])?;
    }

    let json = serde_json::to_string_pretty(&workflow.spec())?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {}", output.display());

    Ok(())
}
