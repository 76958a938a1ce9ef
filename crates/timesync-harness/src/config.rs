//! Scenario and harness configuration
//!
//! `ScenarioConfig` is the immutable per-run input. `HarnessConfig` holds the
//! environment-level settings (agent location, timing, runner wrappers) and can
//! be loaded from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::types::{Mode, RoleKind};

/// Environment variable naming a harness config file
pub const CONFIG_PATH_ENV: &str = "TIMESYNC_HARNESS_CONFIG";

/// Agent binary searched on `PATH` when no explicit path is configured
pub const DEFAULT_AGENT_BINARY: &str = "mock-device";

// ----------------------------------------------------------------------------
// Timing Configuration
// ----------------------------------------------------------------------------

/// Fixed delays and the bound on synchronization waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Hold after the induced server restart in auto mode
    pub settle_delay_secs: u64,
    /// Hold for a tunnel-relayed exchange to complete
    pub tunnel_hold_secs: u64,
    /// Upper bound on any wait for an output marker
    pub sync_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 3,
            tunnel_hold_secs: 40,
            sync_timeout_secs: 120,
        }
    }
}

impl TimingConfig {
    /// No fixed delays; used by tests
    pub fn immediate() -> Self {
        Self {
            settle_delay_secs: 0,
            tunnel_hold_secs: 0,
            sync_timeout_secs: 5,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn tunnel_hold(&self) -> Duration {
        Duration::from_secs(self.tunnel_hold_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Agent Configuration
// ----------------------------------------------------------------------------

/// Where to find the mock agent binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Explicit path; takes precedence over the `PATH` search
    pub path: Option<PathBuf>,
    /// Binary name searched on `PATH`
    pub binary_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            path: None,
            binary_name: DEFAULT_AGENT_BINARY.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

// ----------------------------------------------------------------------------
// Runner Configuration
// ----------------------------------------------------------------------------

/// Wrappers applied by the local process runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Run agents under `strace` and collect the trace
    pub strace: bool,
    /// Directory for trace files; the system temp dir when unset
    pub trace_dir: Option<PathBuf>,
    /// Run each agent inside the network namespace of its node
    pub netns: bool,
    /// Prefix prepended to node names to form namespace names
    pub netns_prefix: String,
    /// How long collection waits for a stopped process to exit
    pub reap_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            strace: false,
            trace_dir: None,
            netns: false,
            netns_prefix: String::new(),
            reap_timeout_secs: 10,
        }
    }
}

impl RunnerConfig {
    pub fn trace_dir(&self) -> PathBuf {
        self.trace_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_secs(self.reap_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Harness Configuration
// ----------------------------------------------------------------------------

/// Environment-level settings, optionally loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub agent: AgentConfig,
    pub timing: TimingConfig,
    pub runner: RunnerConfig,
}

impl HarnessConfig {
    /// Load from `path`, else from `$TIMESYNC_HARNESS_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&env_path));
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ----------------------------------------------------------------------------
// Scenario Configuration
// ----------------------------------------------------------------------------

/// Per-role fault-injection specifications, passed through verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    pub client: Option<String>,
    pub coordinator: Option<String>,
    pub server: Option<String>,
}

impl FaultConfig {
    pub fn for_role(&self, kind: RoleKind) -> Option<&str> {
        match kind {
            RoleKind::Client => self.client.as_deref(),
            RoleKind::Coordinator => self.coordinator.as_deref(),
            RoleKind::Server => self.server.as_deref(),
        }
    }
}

/// Immutable input of one scenario run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// Name or address of the client node
    pub client: Option<String>,
    /// Name or address of the coordinator node
    pub coordinator: Option<String>,
    /// Name or address of the server node, or the `"service"` sentinel
    pub server: Option<String>,
    pub mode: Mode,
    /// Network tap interface passed to every agent
    pub tap: Option<String>,
    pub faults: FaultConfig,
    /// Number of sync iterations the client performs
    pub iterations: Option<u32>,
    /// Suppress the coloured pass/fail line
    pub quiet: bool,
    /// Suffix appended to every process tag of this run
    pub test_tag: String,
    pub skip_coordinator: bool,
    pub skip_server: bool,
    pub timing: TimingConfig,
    pub agent: AgentConfig,
}

impl ScenarioConfig {
    /// Config for three named nodes with everything else defaulted
    pub fn for_nodes(client: &str, coordinator: &str, server: &str) -> Self {
        Self {
            client: Some(client.to_string()),
            coordinator: Some(coordinator.to_string()),
            server: Some(server.to_string()),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply the environment-level settings of a harness config
    pub fn with_harness(mut self, harness: &HarnessConfig) -> Self {
        self.timing = harness.timing.clone();
        self.agent = harness.agent.clone();
        self
    }

    pub fn token(&self, kind: RoleKind) -> Option<&str> {
        match kind {
            RoleKind::Client => self.client.as_deref(),
            RoleKind::Coordinator => self.coordinator.as_deref(),
            RoleKind::Server => self.server.as_deref(),
        }
    }
}
