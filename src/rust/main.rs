// SPDX-License-Identifier: PMPL-1.0-or-later

//! solguard CLI - Main binary entry point
//!
//! Runs verifications locally against an in-memory store, or serves the
//! HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use solguard::config::AppConfig;
use solguard::core::{JobStatus, VerificationJob};
use solguard::executor::runner::probe_version;
use solguard::job::VerificationService;
use solguard::prover::ProverRuntime;
use solguard::server::{self, AppState};
use solguard::store::MemoryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod output;

use output::{OutputFormat, OutputFormatter, ToolStatus};

/// solguard - smart-contract verification workflows
#[derive(Parser)]
#[command(name = "solguard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SOLGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP API server
    Serve {
        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Enable CORS
        #[arg(long)]
        cors: bool,
    },

    /// Run a simple verification: static analysis plus AI reformatting
    Analyze {
        /// Solidity source file
        file: PathBuf,

        /// Seconds to wait for the job to finish
        #[arg(long, default_value = "1800")]
        wait: u64,
    },

    /// Run a deep verification: drafted specification, approval, formal proof
    Deep {
        /// Solidity source file
        file: PathBuf,

        /// Approved specification text to prove against
        #[arg(long, conflicts_with = "approve_draft")]
        spec_file: Option<PathBuf>,

        /// Prove against the drafted specification without review
        #[arg(long)]
        approve_draft: bool,

        /// Seconds to wait for each phase
        #[arg(long, default_value = "3600")]
        wait: u64,
    },

    /// Report availability of the configured tools and AI backends
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let formatter = OutputFormatter::new(cli.format);
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host, cors } => {
            serve_command(config, port, host, cors).await?;
        }
        Commands::Analyze { file, wait } => {
            analyze_command(&config, &file, Duration::from_secs(wait), &formatter).await?;
        }
        Commands::Deep {
            file,
            spec_file,
            approve_draft,
            wait,
        } => {
            deep_command(
                &config,
                &file,
                spec_file.as_deref(),
                approve_draft,
                Duration::from_secs(wait),
                &formatter,
            )
            .await?;
        }
        Commands::Tools => {
            tools_command(&config, &formatter).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::{fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("solguard=debug,info")
    } else {
        EnvFilter::new("solguard=info,warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve_command(mut config: AppConfig, port: Option<u16>, host: Option<String>, cors: bool) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    config.server.cors |= cors;

    let store = Arc::new(MemoryStore::new());
    let service = VerificationService::from_config(&config, store.clone())?;
    let state = AppState {
        service: Arc::new(service),
        projects: store,
    };
    server::start_server(&config.server, state).await
}

/// Register `file` as a project in a fresh in-memory service
async fn local_service(config: &AppConfig, file: &Path) -> Result<(VerificationService, String)> {
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read contract: {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contract.sol".to_string());

    let store = Arc::new(MemoryStore::new());
    let project = store.create_project(name, code).await;
    let service = VerificationService::from_config(config, store)?;
    Ok((service, project.id))
}

async fn analyze_command(config: &AppConfig, file: &Path, wait: Duration, formatter: &OutputFormatter) -> Result<()> {
    let (service, project_id) = local_service(config, file).await?;
    let job_id = service.start_simple(&project_id).await?;
    info!("Started simple verification {}", job_id);

    let job = wait_with_spinner(&service, &job_id, "Analyzing contract...", wait, formatter, |job| {
        job.status.is_terminal()
    })
    .await?;
    finish(job, formatter)
}

async fn deep_command(
    config: &AppConfig,
    file: &Path,
    spec_file: Option<&Path>,
    approve_draft: bool,
    wait: Duration,
    formatter: &OutputFormatter,
) -> Result<()> {
    // read the approved text up front so a bad path fails before any work
    let approved = match spec_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read specification: {}", path.display()))?,
        ),
        None => None,
    };

    let (service, project_id) = local_service(config, file).await?;
    let job_id = service.start_deep(&project_id).await?;

    let job = wait_with_spinner(&service, &job_id, "Drafting specification...", wait, formatter, |job| {
        job.status != JobStatus::Running
    })
    .await?;
    if job.status != JobStatus::AwaitingConfirmation {
        return finish(job, formatter);
    }

    let approved = match (approved, approve_draft) {
        (Some(text), _) => text,
        (None, true) => job.spec_draft.clone().unwrap_or_default(),
        (None, false) => {
            formatter.job(&job)?;
            formatter.info("Review the draft, then re-run with --spec-file <FILE> or --approve-draft")?;
            return Ok(());
        }
    };

    service.confirm(&job_id, &approved).await?;
    let job = wait_with_spinner(&service, &job_id, "Proving specification...", wait, formatter, |job| {
        job.status.is_terminal()
    })
    .await?;
    finish(job, formatter)
}

async fn tools_command(config: &AppConfig, formatter: &OutputFormatter) -> Result<()> {
    let mut tools = Vec::new();

    let analyzer = probe_version(&config.analyzer.executable).await;
    tools.push(ToolStatus {
        name: "analyzer".to_string(),
        available: analyzer.is_some(),
        detail: analyzer.unwrap_or_else(|| format!("{} not found", config.analyzer.executable.display())),
    });

    let python = probe_version(&config.prover.python).await;
    tools.push(ToolStatus {
        name: "python".to_string(),
        available: python.is_some(),
        detail: python.unwrap_or_else(|| format!("{} not found", config.prover.python.display())),
    });

    let runtime = ProverRuntime::new(config.prover.clone());
    let installed = runtime.interpreter().exists();
    tools.push(ToolStatus {
        name: "prover".to_string(),
        available: installed,
        detail: if installed {
            format!("runtime at {}", runtime.root().display())
        } else {
            format!("runtime will be built in {} on first use", runtime.root().display())
        },
    });

    if config.ai.backends.is_empty() {
        warn!("No AI backends configured");
    }
    for backend in &config.ai.backends {
        let credential = backend.credential().is_some();
        tools.push(ToolStatus {
            name: format!("ai:{}", backend.name),
            available: credential,
            detail: format!(
                "{} ({}){}",
                backend.endpoint,
                backend.model,
                if credential { "" } else { ", no credential" }
            ),
        });
    }

    formatter.header("Tools")?;
    formatter.tools(&tools)
}

async fn wait_with_spinner<F>(
    service: &VerificationService,
    job_id: &str,
    message: &str,
    wait: Duration,
    formatter: &OutputFormatter,
    done: F,
) -> Result<VerificationJob>
where
    F: Fn(&VerificationJob) -> bool,
{
    let pb = (!formatter.is_json()).then(|| create_progress_bar(message));
    let job = service.wait_for(job_id, &done, wait).await?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    if !done(&job) {
        bail!("Timed out after {}s waiting for job {} ({})", wait.as_secs(), job_id, job.status);
    }
    Ok(job)
}

fn finish(job: VerificationJob, formatter: &OutputFormatter) -> Result<()> {
    formatter.job(&job)?;
    match job.status {
        JobStatus::Failed => {
            formatter.error("Verification failed")?;
            bail!("verification {} failed", job.id)
        }
        _ => formatter.success("Verification completed"),
    }
}

/// Create a progress bar with standard styling
fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
