//! Error types for the time sync harness
//!
//! Configuration problems are fatal and surface before any agent process is
//! started. Runner errors come from the process layer. `ScenarioError` unifies
//! both and adds the bounded synchronization wait.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::RoleKind;

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Precondition failures detected while validating and resolving a scenario
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing name or address of the time sync {role} node.")]
    MissingRoleToken { role: RoleKind },

    #[error("Fabric has not been created yet.")]
    FabricNotCreated,

    #[error("Unknown identity of the {role} node ({token}).")]
    UnknownNode { role: RoleKind, token: String },

    #[error("Could not find IP address of the {role} node.")]
    MissingAddress { role: RoleKind },

    #[error("Could not find node ID of the {role} node.")]
    MissingIdentity { role: RoleKind },

    #[error("Unknown time sync mode '{0}' (expected auto, local, service or service-over-tunnel)")]
    InvalidMode(String),

    #[error("Invalid node identity '{0}': expected up to 16 hex digits")]
    InvalidIdentity(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ----------------------------------------------------------------------------
// Runner Errors
// ----------------------------------------------------------------------------

/// Failures reported by a process runner
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to start process {tag}: {source}")]
    Spawn {
        tag: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output of process {tag} closed before '{marker}' appeared")]
    OutputClosed { tag: String, marker: String },

    #[error("Process {tag} is already running")]
    DuplicateTag { tag: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Scenario Errors
// ----------------------------------------------------------------------------

/// Top-level error returned by a scenario run
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Timed out after {timeout:?} waiting for '{marker}' from the {role}")]
    SyncTimeout {
        role: RoleKind,
        marker: String,
        timeout: Duration,
    },

    #[error("{role} process: {source}")]
    Runner {
        role: RoleKind,
        #[source]
        source: RunnerError,
    },
}

impl ScenarioError {
    /// Whether the run was aborted before any agent process was touched
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result alias used across the harness
pub type Result<T, E = ScenarioError> = std::result::Result<T, E>;
