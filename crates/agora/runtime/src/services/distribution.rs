//! Seams to the outside world: remote kernels and membership authorities

use agora_types::{
    ConditionFailure, Credentials, GroupAddress, Message, PlayerAddress, RoleAddress, RoleTypeId,
};

/// Bridge to remote kernels hosting the same groups.
///
/// Only consulted by distributed groups.
pub trait DistantContextHandler: Send + Sync {
    /// Deliver to a remote receiver; returns its address if one accepted.
    fn send_message(&self, group: &GroupAddress, message: &Message) -> Option<RoleAddress>;

    fn broadcast_message(&self, group: &GroupAddress, message: &Message);

    fn inform_local_role_taken(
        &self,
        group: &GroupAddress,
        role: &RoleTypeId,
        player: &PlayerAddress,
    );

    fn inform_local_role_released(
        &self,
        group: &GroupAddress,
        role: &RoleTypeId,
        player: &PlayerAddress,
    );
}

/// Authority deciding who may take roles in a group
pub trait MembershipService: Send + Sync {
    fn validate_role_taker(
        &self,
        player: &PlayerAddress,
        role: &RoleTypeId,
        credentials: Option<&Credentials>,
    ) -> Result<(), ConditionFailure>;
}
