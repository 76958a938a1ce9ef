//! Agent command-line construction
//!
//! Pure functions from resolved roles and scenario settings to the argument
//! list of the mock agent. The binary path is prepended by the lifecycle
//! controller once the agent has been located.

use std::path::{Path, PathBuf};

use crate::config::ScenarioConfig;
use crate::types::{Mode, ResolvedRoles, RoleKind};

/// A fully assembled agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn new(program: &Path, args: Vec<String>) -> Self {
        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    /// Shell-style rendering for logs
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Build the agent arguments for `kind`.
///
/// Returns `None` when the role is not part of this run.
pub fn build_args(kind: RoleKind, roles: &ResolvedRoles, config: &ScenarioConfig) -> Option<Vec<String>> {
    let role = roles.get(kind)?;

    let mut args = vec![
        "--debug-resource-usage".to_string(),
        "--print-fault-counters".to_string(),
        "--node-addr".to_string(),
        role.address.to_string(),
        kind.role_flag().to_string(),
    ];

    if kind == RoleKind::Client {
        args.push(config.mode.client_flag().to_string());
        if config.mode == Mode::ServiceOverTunnel {
            // The tunnel path addresses the server directly instead of discovering it.
            args.push("--ts-server-node-id".to_string());
            args.push(roles.server.identity.to_string());
            args.push("--ts-server-node-addr".to_string());
            args.push(roles.server.address.to_string());
        }
    }

    if let Some(tap) = &config.tap {
        args.push("--interface".to_string());
        args.push(tap.clone());
    }

    if let Some(faults) = config.faults.for_role(kind) {
        args.push("--faults".to_string());
        args.push(faults.to_string());
    }

    if kind == RoleKind::Client {
        if let Some(iterations) = config.iterations {
            args.push("--iterations".to_string());
            args.push(iterations.to_string());
        }
    }

    Some(args)
}
