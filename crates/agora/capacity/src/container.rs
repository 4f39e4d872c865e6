//! Per-player capacity container

use crate::error::{CapacityError, CapacityResult};
use crate::implementation::CapacityImplementation;
use agora_types::CapacityId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The capacities a player provides, with their implementations in
/// registration order
#[derive(Default)]
pub struct CapacityContainer {
    implementations: RwLock<BTreeMap<CapacityId, Vec<Arc<dyn CapacityImplementation>>>>,
}

impl CapacityContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, implementation: Arc<dyn CapacityImplementation>) {
        let capacity = implementation.capacity().clone();
        debug!(capacity = %capacity, "Capacity implementation registered");
        self.implementations
            .write()
            .entry(capacity)
            .or_default()
            .push(implementation);
    }

    /// Drop every implementation of `capacity`. Returns how many were removed.
    pub fn remove(&self, capacity: &CapacityId) -> usize {
        self.implementations
            .write()
            .remove(capacity)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn provides(&self, capacity: &CapacityId) -> bool {
        self.implementations
            .read()
            .get(capacity)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn capacities(&self) -> Vec<CapacityId> {
        self.implementations.read().keys().cloned().collect()
    }

    /// The preferred (first registered) implementation of `capacity`.
    pub fn implementation(
        &self,
        capacity: &CapacityId,
    ) -> CapacityResult<Arc<dyn CapacityImplementation>> {
        self.implementations
            .read()
            .get(capacity)
            .and_then(|v| v.first().cloned())
            .ok_or_else(|| CapacityError::MissingImplementation(capacity.clone()))
    }

    pub fn implementations(&self, capacity: &CapacityId) -> Vec<Arc<dyn CapacityImplementation>> {
        self.implementations
            .read()
            .get(capacity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.implementations.read().is_empty()
    }
}
