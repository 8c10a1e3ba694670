//! # Content Architect Configuration Validator
//!
//! Command-line tool for validating configuration and workflow templates
//! before starting an orchestration system. Exits non-zero on any error.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use content_architect::config::{ConfigManager, OrchestrationConfig};
use content_architect::models::{Workflow, WorkflowFilter};
use content_architect::registry::WorkflowRegistry;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Content Architect configuration and workflow templates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration and every workflow template
    All,

    /// Validate configuration only
    Config,

    /// Print each workflow's execution order and parallel batches
    Workflows {
        /// Only show workflows of this type
        #[arg(short = 't', long)]
        workflow_type: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Config) => validate_config(&cli).map(|_| ()),
        Some(Commands::Workflows { workflow_type }) => {
            show_workflows(&cli, workflow_type.as_deref()).await
        }
        Some(Commands::All) | None => validate_all(&cli).await,
    };

    match result {
        Ok(()) => {
            info!("Validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn validate_config(cli: &Cli) -> Result<OrchestrationConfig> {
    println!("🔧 Validating Content Architect Configuration");
    println!("Environment: {}", cli.environment);

    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
            .with_context(|| format!("loading configuration for '{}'", cli.environment))?;
    println!(
        "Config Directory: {}",
        manager.config_directory().display()
    );

    let config = manager.config().clone();
    println!("✅ Configuration loaded and validated");
    println!(
        "   executor: default step timeout {}ms, max {}ms, {} parallel step(s)",
        config.executor.default_step_timeout_ms,
        config.executor.max_step_timeout_ms,
        config.executor.max_parallel_steps
    );
    println!(
        "   jobs: {} retries, retention {}h",
        config.jobs.default_max_retries, config.jobs.retention_hours
    );
    if config.broker.enabled {
        println!(
            "   broker: capacity {}, {} worker(s)",
            config.broker.queue_capacity, config.broker.worker_count
        );
    } else {
        println!("   broker: disabled, every job runs inline");
    }
    println!();

    Ok(config)
}

async fn load_registry(config: &OrchestrationConfig) -> Result<WorkflowRegistry> {
    let registry = WorkflowRegistry::in_memory();

    if config.workflows.load_builtin_templates {
        let count = registry
            .load_builtin_templates()
            .await
            .context("registering built-in workflows")?;
        println!("✅ {count} built-in workflow(s) valid");
    }

    if let Some(dir) = &config.workflows.template_directory {
        if dir.is_dir() {
            let count = registry
                .load_templates_from_dir(dir)
                .await
                .with_context(|| format!("loading templates from {}", dir.display()))?;
            println!("✅ {count} template(s) valid in {}", dir.display());
        } else {
            println!("⚠️  Template directory {} not found, skipped", dir.display());
        }
    }

    Ok(registry)
}

async fn validate_all(cli: &Cli) -> Result<()> {
    let config = validate_config(cli)?;
    println!("📚 Validating Workflow Templates...");
    let registry = load_registry(&config).await?;

    let stats = registry.stats().await?;
    if stats.total_workflows == 0 {
        bail!("no workflows registered; enable built-in templates or add a template directory");
    }
    for (workflow_type, count) in &stats.workflow_types {
        println!("   • {workflow_type}: {count} active workflow(s)");
    }
    Ok(())
}

async fn show_workflows(cli: &Cli, workflow_type: Option<&str>) -> Result<()> {
    let config = validate_config(cli)?;
    let registry = load_registry(&config).await?;

    let filter = WorkflowFilter {
        workflow_type: workflow_type.map(str::to_string),
        ..Default::default()
    };
    let workflows = registry.list(&filter).await?;
    if workflows.is_empty() {
        bail!("no workflows match");
    }

    for workflow in &workflows {
        print_plan(&registry, workflow, config.executor.max_parallel_steps)?;
    }
    Ok(())
}

fn print_plan(registry: &WorkflowRegistry, workflow: &Workflow, max_width: usize) -> Result<()> {
    println!();
    println!(
        "📋 {} ({}, type {}, v{}{})",
        workflow.name,
        workflow.id,
        workflow.workflow_type,
        workflow.version,
        if workflow.is_active { "" } else { ", inactive" }
    );

    let order = registry.execution_order(workflow)?;
    for (position, step) in order.iter().enumerate() {
        let mut flags = Vec::new();
        if !step.required {
            flags.push("optional");
        }
        if step.retryable {
            flags.push("retryable");
        }
        println!(
            "   {:>2}. [{}] {} -> {}{}",
            position + 1,
            step.layer,
            step.name,
            step.service_ref,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            }
        );
    }

    let batches = registry.execution_batches(workflow, max_width)?;
    println!("   batches (width {max_width}):");
    for (index, batch) in batches.iter().enumerate() {
        let names: Vec<&str> = batch.iter().map(|step| step.name.as_str()).collect();
        println!("     {}: {}", index + 1, names.join(", "));
    }
    Ok(())
}
