//! drover: command-line harness for decision-driven workers
//!
//! Runs the demo NPC worker against a configured decision service.

mod demo;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use drover_core::{Config, HttpDecisionClient, RunStatus, Worker};

#[derive(Debug, Parser)]
#[command(name = "drover")]
#[command(about = "Command-line harness for decision-driven workers", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the demo worker on a task
    Run {
        /// The task to hand to the worker
        task: Vec<String>,

        /// Abort after this many loop iterations
        #[arg(long)]
        max_steps: Option<usize>,

        /// Skip dispatching a function named on the terminating step
        #[arg(long)]
        no_final_dispatch: bool,
    },

    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            task,
            max_steps,
            no_final_dispatch,
        } => {
            let task_text = task.join(" ");
            run(&task_text, max_steps, no_final_dispatch).await
        }
        Commands::Config => show_config(),
    }
}

async fn run(task: &str, max_steps: Option<usize>, no_final_dispatch: bool) -> Result<()> {
    if task.is_empty() {
        anyhow::bail!("no task given");
    }

    let config = Config::load().context("Failed to load configuration")?;
    let client = Arc::new(HttpDecisionClient::from_config(&config));

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next iteration boundary");
            ctrl_c_token.cancel();
        }
    });

    let mut worker = Worker::new(client, demo::npc_worker())?
        .with_retry_config(config.retry_config())
        .with_cancellation(cancel)
        .with_dispatch_on_finish(!no_final_dispatch);
    if let Some(limit) = max_steps {
        worker = worker.with_max_steps(limit);
    }

    let report = worker.run(task).await?;

    match report.status {
        RunStatus::Done => println!("Task finished after {} steps.", report.steps),
        RunStatus::Failed => println!("Task failed after {} steps.", report.steps),
    }
    if let Some(message) = &report.last_message {
        println!("Last message: {message}");
    }
    println!(
        "Final state:\n{}",
        serde_json::to_string_pretty(report.state.as_map())?
    );
    Ok(())
}

fn show_config() -> Result<()> {
    // Inspectable even without an API key.
    let config = match Config::load() {
        Ok(config) => config,
        Err(_) => Config::default_minimal(),
    };
    println!("base_url: {}", config.base_url);
    println!("token_url: {}", config.token_url);
    println!("request_timeout_secs: {}", config.request_timeout_secs);
    println!("retry.max_retries: {}", config.retry.max_retries);
    println!("retry.base_delay_secs: {}", config.retry.base_delay_secs);
    println!(
        "api_key: {}",
        if config.api_key.is_empty() {
            "(unset)"
        } else {
            "(set)"
        }
    );
    Ok(())
}
