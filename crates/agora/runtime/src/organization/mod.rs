//! Organizations: catalogs of role types
//!
//! An organization names the role types its groups may host, how they
//! specialise each other and which conditions gate them. Exactly one
//! instance per type lives in a kernel context, owned by the
//! [`OrganizationRepository`].

mod factory;
mod repository;

pub use factory::*;
pub use repository::*;

use agora_types::{Condition, ConditionSet, GroupAddress, OrganizationTypeId, RoleTypeId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A role type as declared by its organization
#[derive(Clone)]
pub struct RoleDefinition {
    pub role_type: RoleTypeId,
    /// More general role this one specialises
    pub parent: Option<RoleTypeId>,
    pub description: String,
    /// Used when a request does not bring its own factory
    pub constructor: Option<Arc<dyn RoleFactory>>,
    pub obtain_conditions: ConditionSet,
    pub leave_conditions: ConditionSet,
}

impl RoleDefinition {
    pub fn new(role_type: impl Into<RoleTypeId>) -> Self {
        Self {
            role_type: role_type.into(),
            parent: None,
            description: String::new(),
            constructor: None,
            obtain_conditions: ConditionSet::new(),
            leave_conditions: ConditionSet::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<RoleTypeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_constructor(mut self, constructor: impl RoleFactory + 'static) -> Self {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Construct the behaviour with `B::default()`
    pub fn with_default_behavior<B>(self) -> Self
    where
        B: crate::role::RoleBehavior + Default + 'static,
    {
        self.with_constructor(DefaultRoleFactory::<B>::new())
    }

    pub fn with_obtain_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.obtain_conditions.push(Arc::new(condition));
        self
    }

    pub fn with_leave_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.leave_conditions.push(Arc::new(condition));
        self
    }
}

impl fmt::Debug for RoleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleDefinition")
            .field("role_type", &self.role_type)
            .field("parent", &self.parent)
            .field("has_constructor", &self.constructor.is_some())
            .field("obtain_conditions", &self.obtain_conditions)
            .field("leave_conditions", &self.leave_conditions)
            .finish()
    }
}

/// Live organization instance
pub struct Organization {
    type_id: OrganizationTypeId,
    roles: BTreeMap<RoleTypeId, RoleDefinition>,
    obtain_conditions: ConditionSet,
    leave_conditions: ConditionSet,
    groups: RwLock<BTreeSet<GroupAddress>>,
}

impl Organization {
    pub fn builder(type_id: impl Into<OrganizationTypeId>) -> OrganizationBuilder {
        OrganizationBuilder {
            type_id: type_id.into(),
            roles: BTreeMap::new(),
            obtain_conditions: ConditionSet::new(),
            leave_conditions: ConditionSet::new(),
        }
    }

    pub fn type_id(&self) -> &OrganizationTypeId {
        &self.type_id
    }

    pub fn defines(&self, role: &RoleTypeId) -> bool {
        self.roles.contains_key(role)
    }

    pub fn definition(&self, role: &RoleTypeId) -> Option<&RoleDefinition> {
        self.roles.get(role)
    }

    pub fn role_types(&self) -> impl Iterator<Item = &RoleTypeId> {
        self.roles.keys()
    }

    /// Whether `role` is `ancestor` or specialises it, transitively.
    pub fn is_subtype(&self, role: &RoleTypeId, ancestor: &RoleTypeId) -> bool {
        let mut current = Some(role);
        let mut hops = 0;
        while let Some(r) = current {
            if r == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.roles.len() {
                return false;
            }
            current = self.roles.get(r).and_then(|d| d.parent.as_ref());
        }
        false
    }

    /// Every defined role type that is `role` or specialises it
    pub fn subtypes_of(&self, role: &RoleTypeId) -> BTreeSet<RoleTypeId> {
        self.roles
            .keys()
            .filter(|candidate| self.is_subtype(candidate, role))
            .cloned()
            .collect()
    }

    /// Group-level obtain conditions copied into every new group
    pub fn obtain_conditions(&self) -> &ConditionSet {
        &self.obtain_conditions
    }

    pub fn leave_conditions(&self) -> &ConditionSet {
        &self.leave_conditions
    }

    pub fn groups(&self) -> Vec<GroupAddress> {
        self.groups.read().iter().cloned().collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    pub(crate) fn add_group(&self, group: GroupAddress) {
        self.groups.write().insert(group);
    }

    /// Returns the number of groups left
    pub(crate) fn remove_group(&self, group: &GroupAddress) -> usize {
        let mut groups = self.groups.write();
        groups.remove(group);
        groups.len()
    }
}

impl fmt::Debug for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Organization")
            .field("type_id", &self.type_id)
            .field("roles", &self.roles.keys().collect::<Vec<_>>())
            .field("groups", &self.group_count())
            .finish()
    }
}

/// Builder for [`Organization`]
pub struct OrganizationBuilder {
    type_id: OrganizationTypeId,
    roles: BTreeMap<RoleTypeId, RoleDefinition>,
    obtain_conditions: ConditionSet,
    leave_conditions: ConditionSet,
}

impl OrganizationBuilder {
    pub fn role(mut self, definition: RoleDefinition) -> Self {
        self.roles.insert(definition.role_type.clone(), definition);
        self
    }

    pub fn obtain_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.obtain_conditions.push(Arc::new(condition));
        self
    }

    pub fn leave_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.leave_conditions.push(Arc::new(condition));
        self
    }

    pub fn build(self) -> Organization {
        Organization {
            type_id: self.type_id,
            roles: self.roles,
            obtain_conditions: self.obtain_conditions,
            leave_conditions: self.leave_conditions,
            groups: RwLock::new(BTreeSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::MaxPlayers;

    fn meeting() -> Organization {
        Organization::builder("Meeting")
            .role(RoleDefinition::new("Attendee"))
            .role(RoleDefinition::new("Initiator").with_parent("Attendee"))
            .role(RoleDefinition::new("Chair").with_parent("Initiator"))
            .obtain_condition(MaxPlayers::any(10))
            .build()
    }

    #[test]
    fn test_subtypes() {
        let org = meeting();
        let attendee = RoleTypeId::new("Attendee");
        let chair = RoleTypeId::new("Chair");
        assert!(org.is_subtype(&chair, &attendee));
        assert!(org.is_subtype(&attendee, &attendee));
        assert!(!org.is_subtype(&attendee, &chair));
        assert_eq!(org.subtypes_of(&RoleTypeId::new("Initiator")).len(), 2);
        assert_eq!(org.subtypes_of(&attendee).len(), 3);
        assert!(org.subtypes_of(&RoleTypeId::new("Participant")).is_empty());
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let org = Organization::builder("Loop")
            .role(RoleDefinition::new("A").with_parent("B"))
            .role(RoleDefinition::new("B").with_parent("A"))
            .build();
        assert!(!org.is_subtype(&RoleTypeId::new("A"), &RoleTypeId::new("C")));
    }

    #[test]
    fn test_group_tracking() {
        let org = meeting();
        let group = GroupAddress::generate(org.type_id().clone());
        org.add_group(group.clone());
        assert_eq!(org.group_count(), 1);
        assert_eq!(org.remove_group(&group), 0);
        assert_eq!(org.obtain_conditions().len(), 1);
    }
}
