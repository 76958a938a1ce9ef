//! Core types shared by the harness stages

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

// ----------------------------------------------------------------------------
// Output Markers
// ----------------------------------------------------------------------------

/// Line fragment the client prints once it has synchronized its clock
pub const SUCCESS_MARKER: &str = "Sync Succeeded";

/// Line fragment coordinator and server print once they accept requests
pub const READY_MARKER: &str = "ready to service events";

/// Server token meaning "use the remote backend instead of a local node"
pub const SERVICE_SENTINEL: &str = "service";

/// Backend service name looked up for the sentinel server
pub const TIME_SERVICE: &str = "Time";

// ----------------------------------------------------------------------------
// Roles and Modes
// ----------------------------------------------------------------------------

/// One of the three participants of a time sync exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Client,
    Coordinator,
    Server,
}

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [Self::Client, Self::Coordinator, Self::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Coordinator => "coordinator",
            Self::Server => "server",
        }
    }

    /// Agent flag selecting this role
    pub fn role_flag(&self) -> &'static str {
        match self {
            Self::Client => "--time-sync-client",
            Self::Coordinator => "--time-sync-coordinator",
            Self::Server => "--time-sync-server",
        }
    }

    /// Process tag for this role, suffixed with the test-run tag
    pub fn process_tag(&self, test_tag: &str) -> String {
        let base = match self {
            Self::Client => "TIME-SYNC-CLIENT",
            Self::Coordinator => "TIME-SYNC-COORDINATOR",
            Self::Server => "TIME-SYNC-SERVER",
        };
        format!("{}{}", base, test_tag)
    }

    /// Marker the orchestrator waits for after starting this role.
    ///
    /// The client has no separate readiness line; its success marker doubles
    /// as the synchronization point.
    pub fn wait_marker(&self) -> &'static str {
        match self {
            Self::Client => SUCCESS_MARKER,
            Self::Coordinator | Self::Server => READY_MARKER,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovery/transport strategy used by the agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Multicast discovery
    #[default]
    Auto,
    /// Direct UDP between local nodes
    Local,
    /// Direct TCP to a backend
    Service,
    /// Reliable messaging relayed over a secure tunnel
    ServiceOverTunnel,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Self::Auto,
        Self::Local,
        Self::Service,
        Self::ServiceOverTunnel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Local => "local",
            Self::Service => "service",
            Self::ServiceOverTunnel => "service-over-tunnel",
        }
    }

    /// Agent flag selecting this mode on the client
    pub fn client_flag(&self) -> &'static str {
        match self {
            Self::Auto => "--time-sync-mode-auto",
            Self::Local => "--time-sync-mode-local",
            Self::Service => "--time-sync-mode-service",
            Self::ServiceOverTunnel => "--time-sync-mode-service-over-tunnel",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Auto => "time sync via multicast discovery (default)",
            Self::Local => "time sync with local nodes via UDP",
            Self::Service => "time sync with the service via TCP",
            Self::ServiceOverTunnel => "time sync with the service over a secure tunnel",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigurationError::InvalidMode(s.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Node Identity
// ----------------------------------------------------------------------------

/// 64-bit protocol-level node id, written as 16 upper-case hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity(u64);

impl NodeIdentity {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for NodeIdentity {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > 16 {
            return Err(ConfigurationError::InvalidIdentity(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ConfigurationError::InvalidIdentity(s.to_string()))
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeIdentity> for String {
    fn from(id: NodeIdentity) -> Self {
        id.to_string()
    }
}

// ----------------------------------------------------------------------------
// Resolved Roles
// ----------------------------------------------------------------------------

/// A role after identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub kind: RoleKind,
    /// Token the user supplied (node name, address or the service sentinel)
    pub token: String,
    /// Simulated node hosting the process; `None` for a remote backend
    pub node: Option<String>,
    pub address: IpAddr,
    pub identity: NodeIdentity,
    pub process_tag: String,
    /// No local process is started, stopped or collected for this role
    pub lifecycle_skipped: bool,
}

impl ResolvedRole {
    /// Node label used in summaries; remote backends show their token
    pub fn display_node(&self) -> &str {
        self.node.as_deref().unwrap_or(&self.token)
    }
}

/// All roles of one run, built once by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoles {
    pub client: ResolvedRole,
    /// `None` when the coordinator is skipped
    pub coordinator: Option<ResolvedRole>,
    pub server: ResolvedRole,
}

impl ResolvedRoles {
    pub fn get(&self, kind: RoleKind) -> Option<&ResolvedRole> {
        match kind {
            RoleKind::Client => Some(&self.client),
            RoleKind::Coordinator => self.coordinator.as_ref(),
            RoleKind::Server => Some(&self.server),
        }
    }

    /// Whether start/stop/collect apply to `kind` in this run
    pub fn has_lifecycle(&self, kind: RoleKind) -> bool {
        self.get(kind).is_some_and(|role| !role.lifecycle_skipped)
    }
}

// ----------------------------------------------------------------------------
// Artifacts and Verdict
// ----------------------------------------------------------------------------

/// One captured text stream with its status code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedStream {
    pub status: i32,
    pub text: String,
}

impl CapturedStream {
    pub fn new(status: i32, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }
}

/// Output and syscall trace of one role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleArtifacts {
    pub output: CapturedStream,
    pub trace: CapturedStream,
}

/// Artifacts of every role; skipped roles keep the empty defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArtifacts {
    pub client: RoleArtifacts,
    pub coordinator: RoleArtifacts,
    pub server: RoleArtifacts,
}

impl RunArtifacts {
    pub fn role(&self, kind: RoleKind) -> &RoleArtifacts {
        match kind {
            RoleKind::Client => &self.client,
            RoleKind::Coordinator => &self.coordinator,
            RoleKind::Server => &self.server,
        }
    }

    pub fn role_mut(&mut self, kind: RoleKind) -> &mut RoleArtifacts {
        match kind {
            RoleKind::Client => &mut self.client,
            RoleKind::Coordinator => &mut self.coordinator,
            RoleKind::Server => &mut self.server,
        }
    }

    /// Flat `<role>_output` / `<role>_strace` mapping handed to callers
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for kind in RoleKind::ALL {
            let role = self.role(kind);
            map.insert(format!("{}_output", kind), role.output.text.clone());
            map.insert(format!("{}_strace", kind), role.trace.text.clone());
        }
        map
    }
}

impl Serialize for RunArtifacts {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

/// Final pass/fail outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    #[serde(flatten)]
    pub artifacts: RunArtifacts,
}

impl Verdict {
    /// Pretty JSON with `passed` and the six artifact keys
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ----------------------------------------------------------------------------
// Scenario Phases
// ----------------------------------------------------------------------------

/// Progress of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScenarioPhase {
    #[default]
    Idle,
    Validated,
    RolesStarting,
    RolesRunning,
    RolesStopping,
    Collected,
    Done,
}
