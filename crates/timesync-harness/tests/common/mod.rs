//! Shared fixtures for the orchestrator integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use timesync_harness::{
    AgentCommand, AgentConfig, CapturedStream, EndpointEntry, NodeIdentity, ProcessRunner,
    RunnerError, ScenarioConfig, TimingConfig, TopologyDirectory,
};

/// One call observed by the recording runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Start {
        node: String,
        tag: String,
        args: Vec<String>,
        wait_marker: Option<String>,
    },
    Stop {
        node: String,
        tag: String,
    },
    CollectOutput {
        tag: String,
    },
    CollectTrace {
        tag: String,
    },
}

/// Process runner that records every call and replays canned output
#[derive(Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<RunnerCall>>>,
    outputs: HashMap<String, String>,
    traces: HashMap<String, String>,
    /// Tags whose start never observes the marker
    stalled: Vec<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, tag: &str, output: &str) -> Self {
        self.outputs.insert(tag.to_string(), output.to_string());
        self
    }

    pub fn with_trace(mut self, tag: &str, trace: &str) -> Self {
        self.traces.insert(tag.to_string(), trace.to_string());
        self
    }

    pub fn stalling_on(mut self, tag: &str) -> Self {
        self.stalled.push(tag.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// `(kind, tag)` pairs of start/stop calls, in order
    pub fn lifecycle(&self) -> Vec<(&'static str, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RunnerCall::Start { tag, .. } => Some(("start", tag)),
                RunnerCall::Stop { tag, .. } => Some(("stop", tag)),
                _ => None,
            })
            .collect()
    }

    pub fn start_args(&self, tag: &str) -> Option<Vec<String>> {
        self.calls().into_iter().find_map(|call| match call {
            RunnerCall::Start { tag: t, args, .. } if t == tag => Some(args),
            _ => None,
        })
    }

    fn record(&self, call: RunnerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn start(
        &mut self,
        node: &str,
        command: &AgentCommand,
        tag: &str,
        wait_marker: Option<&str>,
    ) -> Result<(), RunnerError> {
        self.record(RunnerCall::Start {
            node: node.to_string(),
            tag: tag.to_string(),
            args: command.args.clone(),
            wait_marker: wait_marker.map(str::to_string),
        });

        if self.stalled.iter().any(|t| t == tag) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn stop(&mut self, node: &str, tag: &str) -> Result<(), RunnerError> {
        self.record(RunnerCall::Stop {
            node: node.to_string(),
            tag: tag.to_string(),
        });
        Ok(())
    }

    async fn collect_output(&mut self, _node: &str, tag: &str) -> Result<CapturedStream, RunnerError> {
        self.record(RunnerCall::CollectOutput {
            tag: tag.to_string(),
        });
        Ok(self
            .outputs
            .get(tag)
            .map(|text| CapturedStream::new(0, text.clone()))
            .unwrap_or_default())
    }

    async fn collect_trace(&mut self, _node: &str, tag: &str) -> Result<CapturedStream, RunnerError> {
        self.record(RunnerCall::CollectTrace {
            tag: tag.to_string(),
        });
        Ok(self
            .traces
            .get(tag)
            .map(|text| CapturedStream::new(0, text.clone()))
            .unwrap_or_default())
    }
}

pub fn entry(address: &str, identity: u64) -> EndpointEntry {
    EndpointEntry::new(address.parse().unwrap(), NodeIdentity::new(identity))
}

/// Fabric with nodes n1..n3 and a Time service backend
pub fn topology() -> TopologyDirectory {
    let mut directory = TopologyDirectory::with_fabric("fab1");
    directory
        .add_node("n1", entry("fd00:0:1:1::1", 0x18B4_3000_0000_0001))
        .add_node("n2", entry("fd00:0:1:1::2", 0x18B4_3000_0000_0002))
        .add_node("n3", entry("fd00:0:1:1::3", 0x18B4_3000_0000_0003))
        .add_service("Time", entry("fd00:0:1:5::1", 0x18B4_3002_0000_0005));
    directory
}

/// A file standing in for the agent binary so the locator finds it
pub fn fake_agent() -> NamedTempFile {
    NamedTempFile::new().unwrap()
}

/// Config for n1/n2/n3 with no fixed delays and the given agent
pub fn scenario(agent: &NamedTempFile) -> ScenarioConfig {
    ScenarioConfig {
        timing: TimingConfig::immediate(),
        agent: AgentConfig::at_path(agent.path()),
        quiet: true,
        ..ScenarioConfig::for_nodes("n1", "n2", "n3")
    }
}
