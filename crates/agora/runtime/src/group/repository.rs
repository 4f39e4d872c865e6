//! Per-context group registry

use super::{GroupOptions, KernelScopeGroup, ReceiverSelector};
use crate::error::KernelResult;
use crate::organization::OrganizationRepository;
use crate::services::DistantContextHandler;
use crate::telemetry::KernelTelemetry;
use agora_types::{GroupAddress, OrganizationTypeId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Canonical map from group addresses to live groups
pub struct GroupRepository {
    groups: DashMap<GroupAddress, Arc<KernelScopeGroup>>,
    organizations: Arc<OrganizationRepository>,
    telemetry: Arc<KernelTelemetry>,
    distant: Option<Arc<dyn DistantContextHandler>>,
    selector: Arc<dyn ReceiverSelector>,
}

impl GroupRepository {
    pub fn new(
        organizations: Arc<OrganizationRepository>,
        telemetry: Arc<KernelTelemetry>,
        distant: Option<Arc<dyn DistantContextHandler>>,
        selector: Arc<dyn ReceiverSelector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            groups: DashMap::new(),
            organizations,
            telemetry,
            distant,
            selector,
        })
    }

    /// Create a group of `organization`, instantiating the organization on
    /// first use.
    pub fn create_group(
        self: &Arc<Self>,
        organization: &OrganizationTypeId,
        options: GroupOptions,
    ) -> KernelResult<Arc<KernelScopeGroup>> {
        let mut address = GroupAddress::generate(organization.clone());
        if let Some(name) = &options.name {
            address = address.with_name(name.clone());
        }
        let instance = self.organizations.attach_group(organization, address.clone())?;

        let group = KernelScopeGroup::new(
            address.clone(),
            Arc::clone(&instance),
            options,
            self.distant.clone(),
            Arc::clone(&self.selector),
            Arc::clone(&self.telemetry),
            Arc::downgrade(self),
        );
        address.bind(&group);
        self.groups.insert(address.clone(), Arc::clone(&group));
        self.telemetry.group_created();

        info!(
            group = %address,
            organization = %organization,
            persistent = group.is_persistent(),
            distributed = group.is_distributed(),
            "Group created"
        );
        Ok(group)
    }

    /// Live group behind `address`. A stale or empty address cache is
    /// refreshed from the registry.
    pub fn resolve(&self, address: &GroupAddress) -> Option<Arc<KernelScopeGroup>> {
        if let Some(group) = address.resolve::<KernelScopeGroup>() {
            if !group.is_removed() {
                return Some(group);
            }
        }
        let group = self.groups.get(address).map(|g| Arc::clone(g.value()))?;
        address.bind(&group);
        Some(group)
    }

    /// Remove a group, detaching it from its organization and dropping the
    /// organization when it has no group left.
    pub fn remove(&self, address: &GroupAddress) -> Option<Arc<KernelScopeGroup>> {
        let (_, group) = self.groups.remove(address)?;
        group.mark_removed();

        let organization = group.organization();
        if !self.organizations.detach_group(organization.type_id(), address) {
            // The registry may already hold a newer instance
            organization.remove_group(address);
        }

        address.unbind();
        group.address().unbind();
        self.telemetry.group_removed();
        info!(group = %address, "Group removed");
        Some(group)
    }

    pub fn contains(&self, address: &GroupAddress) -> bool {
        self.groups.contains_key(address)
    }

    pub fn groups(&self) -> Vec<Arc<KernelScopeGroup>> {
        self.groups.iter().map(|g| Arc::clone(g.value())).collect()
    }

    pub fn groups_of(&self, organization: &OrganizationTypeId) -> Vec<Arc<KernelScopeGroup>> {
        self.groups
            .iter()
            .filter(|g| g.key().organization() == organization)
            .map(|g| Arc::clone(g.value()))
            .collect()
    }

    pub fn organizations(&self) -> &Arc<OrganizationRepository> {
        &self.organizations
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
