//! Group and role addresses
//!
//! Addresses are durable identities. They compare, hash and order by their
//! identity fields only; the live-object cache they carry never affects
//! equality, so two addresses for the same triple are equal whatever they
//! are currently bound to.

use crate::binding::LiveBinding;
use crate::ids::{OrganizationTypeId, PlayerAddress, RoleTypeId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Address of a group: (UUID, organization type)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupAddress {
    id: Uuid,
    organization: OrganizationTypeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip)]
    binding: LiveBinding,
}

impl GroupAddress {
    pub fn generate(organization: OrganizationTypeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization,
            name: None,
            binding: LiveBinding::new(),
        }
    }

    pub fn from_parts(id: Uuid, organization: OrganizationTypeId, name: Option<String>) -> Self {
        Self {
            id,
            organization,
            name,
            binding: LiveBinding::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn organization(&self) -> &OrganizationTypeId {
        &self.organization
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bind<T: Any + Send + Sync>(&self, group: &Arc<T>) {
        self.binding.bind(group);
    }

    pub fn unbind(&self) {
        self.binding.unbind();
    }

    /// Cached live group, if any. Callers needing certainty go through the
    /// group repository, which rebinds on a miss.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.binding.resolve()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }
}

impl PartialEq for GroupAddress {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.organization == other.organization
    }
}

impl Eq for GroupAddress {}

impl Hash for GroupAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.organization.hash(state);
    }
}

impl PartialOrd for GroupAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.organization.cmp(&other.organization))
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "group:{}({}@{})", name, self.id, self.organization),
            None => write!(f, "group:{}@{}", self.id, self.organization),
        }
    }
}

/// Address of a role: (group, role type, player)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleAddress {
    group: GroupAddress,
    role_type: RoleTypeId,
    player: PlayerAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip)]
    binding: LiveBinding,
}

impl RoleAddress {
    pub fn new(group: GroupAddress, role_type: RoleTypeId, player: PlayerAddress) -> Self {
        Self {
            group,
            role_type,
            player,
            name: None,
            binding: LiveBinding::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(&self) -> &GroupAddress {
        &self.group
    }

    pub fn role_type(&self) -> &RoleTypeId {
        &self.role_type
    }

    pub fn player(&self) -> &PlayerAddress {
        &self.player
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bind<T: Any + Send + Sync>(&self, role: &Arc<T>) {
        self.binding.bind(role);
    }

    pub fn unbind(&self) {
        self.binding.unbind();
    }

    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.binding.resolve()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }
}

impl PartialEq for RoleAddress {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.role_type == other.role_type
            && self.player == other.player
    }
}

impl Eq for RoleAddress {}

impl Hash for RoleAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.role_type.hash(state);
        self.player.hash(state);
    }
}

impl PartialOrd for RoleAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RoleAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then_with(|| self.role_type.cmp(&other.role_type))
            .then_with(|| self.player.cmp(&other.player))
    }
}

impl fmt::Display for RoleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role:{}/{}/{}", self.group, self.role_type, self.player)
    }
}
