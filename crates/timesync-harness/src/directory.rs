//! Node and service directory
//!
//! The orchestrator only reads from the directory. `TopologyDirectory` is the
//! file-backed implementation used by the runner binary and the tests.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::types::NodeIdentity;

/// Read-only view of the simulated network
pub trait Directory {
    /// Whether the fabric the nodes belong to has been created
    fn fabric_exists(&self) -> bool;

    /// Map a user-supplied name or address to a node identifier
    fn resolve_node(&self, token: &str) -> Option<String>;

    fn node_address(&self, node: &str) -> Option<IpAddr>;

    fn node_identity(&self, node: &str) -> Option<NodeIdentity>;

    /// Address of a remote backend service
    fn service_address(&self, service: &str) -> Option<IpAddr>;

    /// Protocol identity of a remote backend service
    fn service_identity(&self, service: &str) -> Option<NodeIdentity>;
}

// ----------------------------------------------------------------------------
// Topology File
// ----------------------------------------------------------------------------

/// Address and identity of one endpoint; either may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    #[serde(default)]
    pub address: Option<IpAddr>,
    #[serde(default)]
    pub identity: Option<NodeIdentity>,
}

impl EndpointEntry {
    pub fn new(address: IpAddr, identity: NodeIdentity) -> Self {
        Self {
            address: Some(address),
            identity: Some(identity),
        }
    }
}

/// Directory backed by a TOML topology description
///
/// ```toml
/// fabric_id = "1"
///
/// [nodes.node01]
/// address = "fd00:0:1:1::1"
/// identity = "18B4300000000001"
///
/// [services.Time]
/// address = "fd00:0:1:5::1"
/// identity = "18B4300200000005"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDirectory {
    #[serde(default)]
    pub fabric_id: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, EndpointEntry>,
    #[serde(default)]
    pub services: BTreeMap<String, EndpointEntry>,
}

impl TopologyDirectory {
    /// Empty topology with the fabric already created
    pub fn with_fabric(fabric_id: impl Into<String>) -> Self {
        Self {
            fabric_id: Some(fabric_id.into()),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>, entry: EndpointEntry) -> &mut Self {
        self.nodes.insert(name.into(), entry);
        self
    }

    pub fn add_service(&mut self, name: impl Into<String>, entry: EndpointEntry) -> &mut Self {
        self.services.insert(name.into(), entry);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Directory for TopologyDirectory {
    fn fabric_exists(&self) -> bool {
        self.fabric_id.is_some()
    }

    fn resolve_node(&self, token: &str) -> Option<String> {
        if self.nodes.contains_key(token) {
            return Some(token.to_string());
        }

        let address: IpAddr = token.parse().ok()?;
        self.nodes
            .iter()
            .find(|(_, entry)| entry.address == Some(address))
            .map(|(name, _)| name.clone())
    }

    fn node_address(&self, node: &str) -> Option<IpAddr> {
        self.nodes.get(node)?.address
    }

    fn node_identity(&self, node: &str) -> Option<NodeIdentity> {
        self.nodes.get(node)?.identity
    }

    fn service_address(&self, service: &str) -> Option<IpAddr> {
        self.services.get(service)?.address
    }

    fn service_identity(&self, service: &str) -> Option<NodeIdentity> {
        self.services.get(service)?.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = r#"
        fabric_id = "fab1"

        [nodes.node01]
        address = "fd00:0:1:1::1"
        identity = "18B4300000000001"

        [nodes.node02]
        address = "10.0.0.2"

        [services.Time]
        address = "fd00:0:1:5::1"
        identity = "18B4300200000005"
    "#;

    #[test]
    fn test_topology_parsing() {
        let directory = TopologyDirectory::from_toml_str(TOPOLOGY).unwrap();
        assert!(directory.fabric_exists());
        assert_eq!(directory.nodes.len(), 2);
        assert_eq!(
            directory.node_identity("node01"),
            Some(NodeIdentity::new(0x18B4_3000_0000_0001))
        );
        assert_eq!(directory.node_identity("node02"), None);
        assert_eq!(
            directory.service_address("Time"),
            Some("fd00:0:1:5::1".parse().unwrap())
        );
    }

    #[test]
    fn test_resolve_by_name_or_address() {
        let directory = TopologyDirectory::from_toml_str(TOPOLOGY).unwrap();
        assert_eq!(directory.resolve_node("node01").as_deref(), Some("node01"));
        assert_eq!(directory.resolve_node("10.0.0.2").as_deref(), Some("node02"));
        assert_eq!(directory.resolve_node("node09"), None);
        assert_eq!(directory.resolve_node("10.0.0.9"), None);
    }

    #[test]
    fn test_missing_fabric() {
        let directory = TopologyDirectory::from_toml_str("[nodes.a]\n").unwrap();
        assert!(!directory.fabric_exists());
        assert_eq!(directory.node_address("a"), None);
    }

    #[test]
    fn test_malformed_identity_rejected() {
        let result = TopologyDirectory::from_toml_str(
            "fabric_id = \"1\"\n[nodes.a]\nidentity = \"xyz\"\n",
        );
        assert!(result.is_err());
    }
}
