//! Courseflow CLI - drive courses through the faculty approval pipeline
//!
//! Every invocation builds an orchestration engine with the reference
//! services, opens the configured workflow store and calls one entry point.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use courseflow_approval::{
    ApprovalAction, FacultyAction, FacultyWorkflowCoordinator, FileWorkflowStore,
    InMemoryWorkflowStore, StartWorkflowRequest, WorkflowStore,
};
use courseflow_engine::{OrchestrationEngine, RunReport};
use courseflow_types::{CourseId, ExecutionState, FacultyId, LearnerId, Subsystem};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod services;

use config::{CourseflowConfig, StorageConfig};

/// Courseflow CLI
#[derive(Parser)]
#[command(name = "courseflow")]
#[command(about = "Courseflow - service orchestration with faculty approval gates", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "COURSEFLOW_CONFIG")]
    config: Option<String>,

    /// Log level (overrides configuration)
    #[arg(long, env = "COURSEFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    /// Keep workflows in memory only
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or resume) the approval workflow of a course
    Start {
        #[arg(long)]
        course: String,
        #[arg(long)]
        faculty: String,
        /// Content source: JSON, or plain text
        #[arg(long)]
        source: String,
        /// Course metadata as JSON
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Apply a faculty decision at the current gate
    Action {
        #[arg(long)]
        course: String,
        /// approve | confirm | finalize | edit | reject
        #[arg(long)]
        action: String,
        #[arg(long)]
        actor: String,
        /// Replacement draft as JSON (required for edit)
        #[arg(long)]
        edits: Option<String>,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Rerun generation for the pending draft
    Regenerate {
        #[arg(long)]
        course: String,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Show the workflow summary of a course
    Status {
        #[arg(long)]
        course: String,
    },

    /// Generate a personalized learning tree
    Plt {
        #[arg(long)]
        course: String,
        #[arg(long)]
        learner: String,
    },

    /// List courses with a workflow
    List,

    /// List registered services
    Services,

    /// Run one subsystem over ad-hoc inputs
    Run {
        /// content | learner | review | metrics
        #[arg(long)]
        subsystem: String,
        /// Input as key=value; values are parsed as JSON when possible
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        CourseflowConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.memory {
        config.storage = StorageConfig::Memory;
    }

    init_tracing(&config);

    let engine = Arc::new(OrchestrationEngine::new(config.engine.clone()));
    services::register_reference_services(&engine).context("Failed to register services")?;

    let store: Arc<dyn WorkflowStore> = match &config.storage {
        StorageConfig::Memory => Arc::new(InMemoryWorkflowStore::new()),
        StorageConfig::File { path } => Arc::new(FileWorkflowStore::new(path.clone())),
    };
    let coordinator = Arc::new(FacultyWorkflowCoordinator::new(engine.clone(), store));

    let interrupted = CancellationToken::new();
    {
        let coordinator = coordinator.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; cancelling in-flight runs");
                interrupted.cancel();
                coordinator.shutdown();
            }
        });
    }

    match cli.command {
        Commands::Start {
            course,
            faculty,
            source,
            metadata,
        } => {
            let response = coordinator
                .start_workflow(StartWorkflowRequest {
                    course_id: CourseId::parse(course)?,
                    faculty_id: FacultyId::parse(faculty)?,
                    content_source: parse_value(&source),
                    course_metadata: metadata.as_deref().map(parse_value).unwrap_or(Value::Null),
                })
                .await?;
            print_json(&response)
        }
        Commands::Action {
            course,
            action,
            actor,
            edits,
            comments,
        } => {
            let action = FacultyAction {
                action: action.parse::<ApprovalAction>()?,
                actor: FacultyId::parse(actor)?,
                edits: edits.as_deref().map(parse_value),
                comments,
            };
            let response = coordinator
                .faculty_action(&CourseId::parse(course)?, action)
                .await?;
            print_json(&response)
        }
        Commands::Regenerate { course, comments } => {
            let response = coordinator
                .regenerate(&CourseId::parse(course)?, comments)
                .await?;
            print_json(&response)
        }
        Commands::Status { course } => {
            let summary = coordinator
                .get_workflow_status(&CourseId::parse(course)?)
                .await?;
            print_json(&summary)
        }
        Commands::Plt { course, learner } => {
            let response = coordinator
                .generate_personalized_learning_tree(
                    &CourseId::parse(course)?,
                    &LearnerId::parse(learner)?,
                )
                .await?;
            print_json(&response)
        }
        Commands::List => print_json(&coordinator.list_workflows().await?),
        Commands::Services => print_json(&engine.list_services()?),
        Commands::Run { subsystem, inputs } => {
            let report =
                run_subsystem(&engine, &subsystem, &inputs, interrupted.child_token()).await?;
            print_json(&report)
        }
    }
}

/// Ad-hoc run of one subsystem over `KEY=VALUE` inputs
async fn run_subsystem(
    engine: &OrchestrationEngine,
    subsystem: &str,
    inputs: &[String],
    cancellation: CancellationToken,
) -> anyhow::Result<RunReport> {
    let subsystem: Subsystem = subsystem.parse()?;
    let mut state = ExecutionState::new();
    for input in inputs {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| anyhow!("Input '{}' is not KEY=VALUE", input))?;
        state.insert(key.trim(), parse_value(value));
    }
    Ok(engine.run_state(subsystem, state, cancellation).await?)
}

fn init_tracing(config: &CourseflowConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// JSON when it parses, otherwise the raw string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
