//! Per-role process lifecycle
//!
//! Wraps a `ProcessRunner` with the agent lookup, the bounded
//! synchronization-on-output wait and artifact collection for one role.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::command::AgentCommand;
use crate::config::AgentConfig;
use crate::errors::{Result, ScenarioError};
use crate::runner::ProcessRunner;
use crate::types::{ResolvedRole, RoleArtifacts};

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The agent binary could not be located; nothing was started
    AgentUnavailable,
}

/// Finds the mock agent binary
#[derive(Debug, Clone)]
pub struct AgentLocator {
    config: AgentConfig,
}

impl AgentLocator {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Path of the agent binary, if it can be found
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.path {
            return path.exists().then(|| path.clone());
        }
        which::which(&self.config.binary_name).ok()
    }
}

/// Starts, stops and collects role processes through a runner
pub struct LifecycleController<'a, R> {
    runner: &'a mut R,
    agent: AgentLocator,
    sync_timeout: Duration,
}

impl<'a, R: ProcessRunner> LifecycleController<'a, R> {
    pub fn new(runner: &'a mut R, agent: AgentLocator, sync_timeout: Duration) -> Self {
        Self {
            runner,
            agent,
            sync_timeout,
        }
    }

    /// Start `role` with `args` and block until `wait_marker` shows up in its
    /// output (an empty marker means no wait).
    pub async fn start_role(
        &mut self,
        role: &ResolvedRole,
        args: Vec<String>,
        wait_marker: &str,
    ) -> Result<StartOutcome> {
        let Some(program) = self.agent.locate() else {
            warn!(
                "Agent binary not found, skipping start of {} ({})",
                role.kind, role.process_tag
            );
            return Ok(StartOutcome::AgentUnavailable);
        };

        let command = AgentCommand::new(&program, args);
        let node = role.display_node();
        info!("Starting {} on {}", role.kind, node);
        debug!("{}: {}", role.process_tag, command.display());

        let marker = (!wait_marker.is_empty()).then_some(wait_marker);
        let start = self.runner.start(node, &command, &role.process_tag, marker);

        match timeout(self.sync_timeout, start).await {
            Ok(Ok(())) => Ok(StartOutcome::Started),
            Ok(Err(source)) => Err(ScenarioError::Runner {
                role: role.kind,
                source,
            }),
            Err(_) => Err(ScenarioError::SyncTimeout {
                role: role.kind,
                marker: wait_marker.to_string(),
                timeout: self.sync_timeout,
            }),
        }
    }

    /// Signal the role's process to stop; output is collected separately
    pub async fn stop_role(&mut self, role: &ResolvedRole) -> Result<()> {
        info!("Stopping {} on {}", role.kind, role.display_node());
        self.runner
            .stop(role.display_node(), &role.process_tag)
            .await
            .map_err(|source| ScenarioError::Runner {
                role: role.kind,
                source,
            })
    }

    /// Final output and trace of the role's process
    pub async fn collect_role(&mut self, role: &ResolvedRole) -> Result<RoleArtifacts> {
        let node = role.display_node();
        let wrap = |source| ScenarioError::Runner {
            role: role.kind,
            source,
        };

        let output = self
            .runner
            .collect_output(node, &role.process_tag)
            .await
            .map_err(wrap)?;
        let trace = self
            .runner
            .collect_trace(node, &role.process_tag)
            .await
            .map_err(wrap)?;

        debug!(
            "Collected {} bytes of output from {} (status {})",
            output.text.len(),
            role.process_tag,
            output.status
        );
        Ok(RoleArtifacts { output, trace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_with_existing_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let locator = AgentLocator::new(AgentConfig::at_path(file.path()));
        assert_eq!(locator.locate(), Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_locator_with_missing_path() {
        let locator = AgentLocator::new(AgentConfig::at_path("/nonexistent/mock-device"));
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn test_locator_searches_path() {
        let locator = AgentLocator::new(AgentConfig {
            path: None,
            binary_name: "definitely-not-an-installed-agent".to_string(),
        });
        assert_eq!(locator.locate(), None);
    }
}
