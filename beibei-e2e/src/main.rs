//! CLI runner for the project-log flow.
//!
//! Drives a real application install: launches (or attaches to) the shell,
//! authenticates, navigates to the log form, fills and submits it, then
//! prints the step report. `--keep-running` holds the app open after the
//! run so the result can be inspected by hand.

use anyhow::{Context, Result};
use beibei_flow::{App, DiagnosticsSink, FlowConfig, FlowData, ProjectLogFlow, StepOutcome};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beibei-e2e", about = "File a Beibei project log end to end")]
struct Cli {
    /// Test-data record (project names, log date, work content).
    #[arg(long, default_value = "test-data/project-log.json")]
    data: PathBuf,

    /// Application executable; overrides ELECTRON_APP_PATH.
    #[arg(long, env = "ELECTRON_APP_PATH")]
    app: Option<PathBuf>,

    /// Directory for the network diagnostics logs.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Keep the application running after the flow until Ctrl-C.
    #[arg(long)]
    keep_running: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = FlowConfig::from_env();
    if cli.app.is_some() {
        config.app_path = cli.app.clone();
    }
    if cli.keep_running {
        config.keep_running = true;
    }

    let data = FlowData::load(&cli.data)
        .with_context(|| format!("loading test data from {}", cli.data.display()))?;
    info!(profile = %config.profile, project = %data.project_name, "starting project-log run");

    let sink = DiagnosticsSink::new(&cli.log_dir);
    let app = App::launch(&config, Some(sink)).await?;

    let flow = ProjectLogFlow::new(app.clone(), data);
    let outcome = flow.run().await;

    println!("\nstep report");
    println!("-----------");
    for record in flow.observer().records() {
        let status = match &record.outcome {
            StepOutcome::Succeeded => "ok".to_string(),
            StepOutcome::Failed(reason) => format!("FAILED: {reason}"),
        };
        let shot = record
            .screenshot
            .as_ref()
            .map(|p| format!("  [{}]", p.display()))
            .unwrap_or_default();
        println!("{:<28} {status}{shot}", record.name);
    }

    if config.keep_running {
        println!("\napplication left running for inspection, press Ctrl-C to close");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
    }

    if let Err(e) = app.close().await {
        info!(error = %e, "application close reported an error");
    }

    outcome?;
    println!("\nproject log filed");
    Ok(())
}
