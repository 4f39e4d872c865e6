//! Error types for message routing

use crate::address::GroupAddress;
use crate::ids::RoleTypeId;

/// Structural routing errors: a misaddressed message is a programming or
/// configuration error and is reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("Message has no sender")]
    UnspecifiedSender,

    #[error("Message has no receiver")]
    UnspecifiedReceiver,

    #[error("Message targets group {target} but was routed through {via}")]
    GroupMismatch {
        target: GroupAddress,
        via: GroupAddress,
    },

    #[error("Role {role} is not defined by organization of {group}")]
    UndefinedRole {
        role: RoleTypeId,
        group: GroupAddress,
    },

    #[error("No receiver playing {role} in {group}")]
    ReceiverNotFound {
        role: RoleTypeId,
        group: GroupAddress,
    },
}

/// Result type alias for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
