//! Time Sync Test Runner
//!
//! Runs one time sync scenario between a client, a coordinator and a server
//! agent on simulated nodes and reports whether the client synchronized.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use timesync_harness::{
    FaultConfig, HarnessConfig, LocalProcessRunner, Mode, ScenarioConfig, ScenarioOrchestrator,
    TopologyDirectory, Verdict,
};

/// Time Sync Test Runner
#[derive(Parser)]
#[command(name = "timesync-test-runner")]
#[command(about = "Run time sync conformance scenarios on simulated nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a time sync scenario
    Run(RunArgs),
    /// List the supported time sync modes
    Modes,
}

#[derive(Args)]
struct RunArgs {
    /// Client node name or address
    #[arg(short = 'c', long)]
    client: Option<String>,

    /// Coordinator node name or address
    #[arg(short = 'o', long)]
    coordinator: Option<String>,

    /// Server node name or address, or "service" for the time service backend
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Time sync mode: auto, local, service or service-over-tunnel
    #[arg(short = 'm', long, default_value = "auto")]
    mode: String,

    /// TAP interface for the agents
    #[arg(short = 'p', long)]
    tap: Option<String>,

    /// Fault injection spec for the client
    #[arg(long)]
    client_faults: Option<String>,

    /// Fault injection spec for the coordinator
    #[arg(long)]
    coordinator_faults: Option<String>,

    /// Fault injection spec for the server
    #[arg(long)]
    server_faults: Option<String>,

    /// Number of sync iterations for the client
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,

    /// Only print the summary line
    #[arg(short, long)]
    quiet: bool,

    /// Suffix appended to every process tag
    #[arg(long, default_value = "")]
    test_tag: String,

    /// Append a random suffix to the test tag
    #[arg(long)]
    unique_tag: bool,

    /// Do not start, stop or collect the coordinator
    #[arg(long)]
    skip_coordinator: bool,

    /// Do not start, stop or collect the server
    #[arg(long)]
    skip_server: bool,

    /// Topology file describing the fabric, nodes and services
    #[arg(long, default_value = "topology.toml")]
    topology: PathBuf,

    /// Harness configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the agent binary
    #[arg(long)]
    agent_path: Option<PathBuf>,

    /// Bound on each synchronization wait (seconds)
    #[arg(long)]
    sync_timeout: Option<u64>,

    /// Run agents under strace and collect the traces
    #[arg(long)]
    strace: bool,

    /// Run agents inside the network namespace of their node
    #[arg(long)]
    netns: bool,

    /// Write the result bundle as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "timesync_test_runner={0},timesync_harness={0}",
            log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Modes => {
            list_modes();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one scenario and map its outcome to an exit code
async fn run(args: RunArgs) -> Result<ExitCode> {
    let (scenario, harness, directory) = match prepare(&args) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("TimeSync: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Starting Time Sync Test Runner");
    info!("Topology: {}", args.topology.display());

    let runner = LocalProcessRunner::new(harness.runner.clone());
    let mut orchestrator = ScenarioOrchestrator::new(directory, runner);

    // Errors are logged by the orchestrator.
    let Ok(verdict) = orchestrator.run(&scenario).await else {
        return Ok(ExitCode::FAILURE);
    };

    if let Some(path) = &args.report {
        write_report(path, &verdict).await?;
    }

    Ok(if verdict.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Load configuration and topology, then apply the command-line overrides
fn prepare(
    args: &RunArgs,
) -> Result<(ScenarioConfig, HarnessConfig, TopologyDirectory), timesync_harness::ConfigurationError>
{
    let mode: Mode = args.mode.parse()?;

    let mut harness = HarnessConfig::load(args.config.as_deref())?;
    if let Some(path) = &args.agent_path {
        harness.agent.path = Some(path.clone());
    }
    if let Some(secs) = args.sync_timeout {
        harness.timing.sync_timeout_secs = secs;
    }
    harness.runner.strace |= args.strace;
    harness.runner.netns |= args.netns;

    let directory = TopologyDirectory::from_file(&args.topology)?;

    let mut test_tag = args.test_tag.clone();
    if args.unique_tag {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        test_tag.push('-');
        test_tag.push_str(&suffix[..8]);
    }

    let scenario = ScenarioConfig {
        client: args.client.clone(),
        coordinator: args.coordinator.clone(),
        server: args.server.clone(),
        mode,
        tap: args.tap.clone(),
        faults: FaultConfig {
            client: args.client_faults.clone(),
            coordinator: args.coordinator_faults.clone(),
            server: args.server_faults.clone(),
        },
        iterations: args.iterations,
        quiet: args.quiet,
        test_tag,
        skip_coordinator: args.skip_coordinator,
        skip_server: args.skip_server,
        ..ScenarioConfig::default()
    }
    .with_harness(&harness);

    Ok((scenario, harness, directory))
}

async fn write_report(path: &Path, verdict: &Verdict) -> Result<()> {
    let json = verdict
        .to_json()
        .context("Failed to serialize result bundle")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Wrote result bundle to {}", path.display());
    Ok(())
}

/// List all supported time sync modes
fn list_modes() {
    println!("Available time sync modes:");
    for mode in Mode::ALL {
        println!("  {:<20} - {}", mode.as_str(), mode.description());
    }
    println!();
    println!("Usage:");
    println!("  timesync-test-runner run -c <client> -o <coordinator> -s <server> -m <mode>");
}
