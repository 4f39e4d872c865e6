//! Per-context organization registry

use super::{Organization, OrganizationFactory};
use crate::error::{KernelError, KernelResult};
use agora_types::{GroupAddress, OrganizationTypeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps organization types to their single live instance
#[derive(Default)]
pub struct OrganizationRepository {
    factories: DashMap<OrganizationTypeId, Arc<dyn OrganizationFactory>>,
    instances: DashMap<OrganizationTypeId, Arc<Organization>>,
}

impl OrganizationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register how to build the organization of `type_id`. Replaces any
    /// previous factory; a live instance is kept.
    pub fn register(
        &self,
        type_id: impl Into<OrganizationTypeId>,
        factory: impl OrganizationFactory + 'static,
    ) {
        let type_id = type_id.into();
        debug!(organization = %type_id, "Organization factory registered");
        self.factories.insert(type_id, Arc::new(factory));
    }

    pub fn is_registered(&self, type_id: &OrganizationTypeId) -> bool {
        self.factories.contains_key(type_id)
    }

    /// The live instance of `type_id`, created on first use
    pub fn get_or_create(&self, type_id: &OrganizationTypeId) -> KernelResult<Arc<Organization>> {
        if let Some(existing) = self.instances.get(type_id) {
            return Ok(Arc::clone(existing.value()));
        }
        self.with_instance(type_id, |_| ())
    }

    /// Record `group` on the live instance of `type_id`, creating the
    /// instance if needed. Holds the registry entry for the whole step so a
    /// concurrent [`detach_group`](Self::detach_group) cannot drop the
    /// instance in between.
    pub fn attach_group(
        &self,
        type_id: &OrganizationTypeId,
        group: GroupAddress,
    ) -> KernelResult<Arc<Organization>> {
        self.with_instance(type_id, |organization| organization.add_group(group))
    }

    /// Forget `group` and drop the instance once no group is left. Returns
    /// whether the instance was released.
    pub fn detach_group(&self, type_id: &OrganizationTypeId, group: &GroupAddress) -> bool {
        let released = self
            .instances
            .remove_if(type_id, |_, organization| organization.remove_group(group) == 0)
            .is_some();
        if released {
            info!(organization = %type_id, "Organization released");
        }
        released
    }

    fn with_instance(
        &self,
        type_id: &OrganizationTypeId,
        update: impl FnOnce(&Organization),
    ) -> KernelResult<Arc<Organization>> {
        let factory = self
            .factories
            .get(type_id)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| KernelError::OrganizationNotRegistered(type_id.clone()));

        match self.instances.entry(type_id.clone()) {
            Entry::Occupied(entry) => {
                update(entry.get());
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let organization = factory?.new_instance(type_id)?;
                if organization.type_id() != type_id {
                    return Err(KernelError::Factory(format!(
                        "factory for {} built {}",
                        type_id,
                        organization.type_id()
                    )));
                }
                update(&organization);
                let organization = Arc::new(organization);
                entry.insert(Arc::clone(&organization));
                info!(organization = %type_id, "Organization instantiated");
                Ok(organization)
            }
        }
    }

    pub fn get(&self, type_id: &OrganizationTypeId) -> Option<Arc<Organization>> {
        self.instances.get(type_id).map(|o| Arc::clone(o.value()))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
