//! Identity resolution and precondition checks
//!
//! Turns the role tokens of a `ScenarioConfig` into concrete node, address and
//! protocol identity. Every failure here is a `ConfigurationError` and happens
//! before any process is started.

use std::net::IpAddr;

use tracing::debug;

use crate::config::ScenarioConfig;
use crate::directory::Directory;
use crate::errors::ConfigurationError;
use crate::types::{
    NodeIdentity, ResolvedRole, ResolvedRoles, RoleKind, SERVICE_SENTINEL, TIME_SERVICE,
};

/// Validate `config` against `directory` and resolve every role
pub fn resolve_roles<D: Directory + ?Sized>(
    config: &ScenarioConfig,
    directory: &D,
) -> Result<ResolvedRoles, ConfigurationError> {
    let client_token = required_token(config, RoleKind::Client)?;
    let coordinator_token = if config.skip_coordinator {
        None
    } else {
        Some(required_token(config, RoleKind::Coordinator)?)
    };
    let server_token = required_token(config, RoleKind::Server)?;

    if !directory.fabric_exists() {
        return Err(ConfigurationError::FabricNotCreated);
    }

    // All tokens are looked up before any address, so an unknown node is
    // reported ahead of a missing address on another role.
    let client_node = lookup_node(directory, RoleKind::Client, client_token)?;
    let coordinator_node = coordinator_token
        .map(|token| lookup_node(directory, RoleKind::Coordinator, token))
        .transpose()?;
    let server_is_service = server_token == SERVICE_SENTINEL;
    let server_node = if server_is_service {
        None
    } else {
        Some(lookup_node(directory, RoleKind::Server, server_token)?)
    };

    let client = node_role(config, directory, RoleKind::Client, client_token, client_node, false)?;

    let coordinator = match (coordinator_token, coordinator_node) {
        (Some(token), Some(node)) => Some(node_role(
            config,
            directory,
            RoleKind::Coordinator,
            token,
            node,
            false,
        )?),
        _ => None,
    };

    let server = match server_node {
        Some(node) => node_role(
            config,
            directory,
            RoleKind::Server,
            server_token,
            node,
            config.skip_server,
        )?,
        None => {
            debug!("Server resolved through the {} service", TIME_SERVICE);
            build_role(
                config,
                RoleKind::Server,
                server_token,
                None,
                directory.service_address(TIME_SERVICE),
                directory.service_identity(TIME_SERVICE),
                true,
            )?
        }
    };

    Ok(ResolvedRoles {
        client,
        coordinator,
        server,
    })
}

fn required_token(config: &ScenarioConfig, kind: RoleKind) -> Result<&str, ConfigurationError> {
    config
        .token(kind)
        .ok_or(ConfigurationError::MissingRoleToken { role: kind })
}

fn lookup_node<D: Directory + ?Sized>(
    directory: &D,
    kind: RoleKind,
    token: &str,
) -> Result<String, ConfigurationError> {
    directory
        .resolve_node(token)
        .ok_or_else(|| ConfigurationError::UnknownNode {
            role: kind,
            token: token.to_string(),
        })
}

fn node_role<D: Directory + ?Sized>(
    config: &ScenarioConfig,
    directory: &D,
    kind: RoleKind,
    token: &str,
    node: String,
    lifecycle_skipped: bool,
) -> Result<ResolvedRole, ConfigurationError> {
    let address = directory.node_address(&node);
    let identity = directory.node_identity(&node);
    build_role(
        config,
        kind,
        token,
        Some(node),
        address,
        identity,
        lifecycle_skipped,
    )
}

fn build_role(
    config: &ScenarioConfig,
    kind: RoleKind,
    token: &str,
    node: Option<String>,
    address: Option<IpAddr>,
    identity: Option<NodeIdentity>,
    lifecycle_skipped: bool,
) -> Result<ResolvedRole, ConfigurationError> {
    let address = address.ok_or(ConfigurationError::MissingAddress { role: kind })?;
    let identity = identity.ok_or(ConfigurationError::MissingIdentity { role: kind })?;

    debug!(
        "Resolved {} '{}' to {} ({}, {})",
        kind,
        token,
        node.as_deref().unwrap_or(SERVICE_SENTINEL),
        address,
        identity
    );

    Ok(ResolvedRole {
        kind,
        token: token.to_string(),
        node,
        address,
        identity,
        process_tag: kind.process_tag(&config.test_tag),
        lifecycle_skipped,
    })
}
