//! Kernel error types

use agora_capacity::CapacityError;
use agora_types::{GroupAddress, OrganizationTypeId, PlayerAddress, RoleTypeId, RoutingError};

/// Structural errors raised by the kernel.
///
/// Refused role requests are not errors; they come back as
/// [`RoleGrant::Refused`](crate::group::RoleGrant::Refused).
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Role {role} is not defined by organization {organization}")]
    UndefinedRole {
        role: RoleTypeId,
        organization: OrganizationTypeId,
    },

    #[error("Group not found: {0}")]
    GroupNotFound(GroupAddress),

    #[error("Group {0} has been removed")]
    GroupRemoved(GroupAddress),

    #[error("No factory registered for organization {0}")]
    OrganizationNotRegistered(OrganizationTypeId),

    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerAddress),

    #[error("Factory failed: {0}")]
    Factory(String),

    #[error("Role behaviour failed: {0}")]
    Behavior(String),
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
