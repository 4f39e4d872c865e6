//! Group membership events

use agora_types::{GroupAddress, RoleAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    /// A role was taken, locally or by a remote player
    RoleTaken(RoleAddress),
    RoleReleased(RoleAddress),
    /// The group emptied and was removed from its repository
    GroupRemoved(GroupAddress),
}

impl GroupEvent {
    pub fn group(&self) -> &GroupAddress {
        match self {
            GroupEvent::RoleTaken(role) | GroupEvent::RoleReleased(role) => role.group(),
            GroupEvent::GroupRemoved(group) => group,
        }
    }
}

/// Observer of a group's membership changes.
///
/// Called after the group lock is released, so it may call back into the
/// group.
pub trait GroupListener: Send + Sync {
    fn on_group_event(&self, event: &GroupEvent);
}
