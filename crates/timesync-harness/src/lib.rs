//! Time Sync Conformance Harness
//!
//! Orchestrates a time synchronization exchange between a client, a
//! coordinator and a server agent running on simulated network nodes, and
//! turns the captured output into a pass/fail verdict.
//!
//! The harness is split into stages:
//! - Identity resolution against a node/service `Directory`
//! - Agent command-line construction
//! - Per-role process lifecycle on top of a `ProcessRunner`
//! - Verdict computation and reporting
//! - The `ScenarioOrchestrator` that sequences them per `Mode`

pub mod command;
pub mod config;
pub mod directory;
pub mod errors;
pub mod lifecycle;
pub mod orchestrator;
pub mod process;
pub mod resolver;
pub mod results;
pub mod runner;
pub mod types;

// Re-export key types for convenience
pub use command::{build_args, AgentCommand};
pub use config::{AgentConfig, FaultConfig, HarnessConfig, RunnerConfig, ScenarioConfig, TimingConfig};
pub use directory::{Directory, EndpointEntry, TopologyDirectory};
pub use errors::{ConfigurationError, RunnerError, ScenarioError};
pub use lifecycle::{AgentLocator, LifecycleController, StartOutcome};
pub use orchestrator::{start_order, ScenarioOrchestrator};
pub use process::LocalProcessRunner;
pub use resolver::resolve_roles;
pub use results::{aggregate, process_results, RunSummary};
pub use runner::ProcessRunner;
pub use types::{
    CapturedStream, Mode, NodeIdentity, ResolvedRole, ResolvedRoles, RoleArtifacts, RoleKind,
    RunArtifacts, ScenarioPhase, Verdict, READY_MARKER, SERVICE_SENTINEL, SUCCESS_MARKER,
};

/// Version of the harness library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
