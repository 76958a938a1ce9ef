//! Verdict computation and run summary
//!
//! The verdict depends only on the client output: the run passes when any
//! line contains the success marker. Coordinator and server output is kept
//! for diagnostics.

use std::fmt;

use colored::Colorize;

use crate::types::{Mode, ResolvedRole, ResolvedRoles, RunArtifacts, Verdict, SUCCESS_MARKER};

/// Whether `client_output` reports a successful sync
pub fn process_results(client_output: &str) -> bool {
    client_output
        .lines()
        .any(|line| line.contains(SUCCESS_MARKER))
}

/// Package the collected artifacts into the final verdict
pub fn aggregate(artifacts: RunArtifacts) -> Verdict {
    let passed = process_results(&artifacts.client.output.text);
    Verdict { passed, artifacts }
}

/// Human-readable description of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: Mode,
    pub server: String,
    pub client: String,
    pub coordinator: Option<String>,
    pub passed: bool,
}

impl RunSummary {
    pub fn new(roles: &ResolvedRoles, mode: Mode, verdict: &Verdict) -> Self {
        Self {
            mode,
            server: endpoint(&roles.server),
            client: endpoint(&roles.client),
            coordinator: roles.coordinator.as_ref().map(endpoint),
            passed: verdict.passed,
        }
    }

    /// Short pass/fail line printed after the summary
    pub fn outcome_line(&self) -> &'static str {
        if self.passed {
            "Time sync succeeded"
        } else {
            "Time sync failed"
        }
    }

    /// Print the summary, followed by a coloured outcome line unless `quiet`
    pub fn print(&self, quiet: bool) {
        println!("{}", self);
        if !quiet {
            let line = if self.passed {
                self.outcome_line().green()
            } else {
                self.outcome_line().red()
            };
            println!("{}", line);
        }
    }
}

fn endpoint(role: &ResolvedRole) -> String {
    format!("{} ({})", role.display_node(), role.address)
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time sync test among server {}, client {}",
            self.server, self.client
        )?;
        if let Some(coordinator) = &self.coordinator {
            write!(f, ", coordinator {}", coordinator)?;
        }
        write!(f, " with {} mode:", self.mode)
    }
}
