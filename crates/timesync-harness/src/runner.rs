//! Process runner seam
//!
//! The orchestrator drives agent processes through this trait. Processes are
//! identified by the node they run on and a tag that is unique within a run.

use async_trait::async_trait;

use crate::command::AgentCommand;
use crate::errors::RunnerError;
use crate::types::CapturedStream;

/// Starts, stops and collects tagged agent processes
#[async_trait]
pub trait ProcessRunner: Send {
    /// Start `command` on `node` under `tag`.
    ///
    /// With a `wait_marker`, returns only once a line of the process output
    /// contains it.
    async fn start(
        &mut self,
        node: &str,
        command: &AgentCommand,
        tag: &str,
        wait_marker: Option<&str>,
    ) -> Result<(), RunnerError>;

    /// Signal the process to stop without waiting for its output.
    ///
    /// Unknown tags are ignored.
    async fn stop(&mut self, node: &str, tag: &str) -> Result<(), RunnerError>;

    /// Final output of a stopped process; empty with status 0 if never started
    async fn collect_output(&mut self, node: &str, tag: &str) -> Result<CapturedStream, RunnerError>;

    /// Syscall trace of a stopped process; empty with status 0 if none
    async fn collect_trace(&mut self, node: &str, tag: &str) -> Result<CapturedStream, RunnerError>;
}
