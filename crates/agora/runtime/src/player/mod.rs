//! Role players
//!
//! A [`RolePlayer`] is the entity behind roles: it owns the memory, signals
//! and capacities its roles share, and schedules them through its
//! [`RoleActivator`].

mod activator;
mod listener;

pub use activator::*;
pub use listener::*;

use crate::error::KernelResult;
use crate::group::{GroupRepository, KernelScopeGroup, RoleGrant};
use crate::organization::RoleFactory;
use crate::role::RoleInstance;
use crate::services::{InMemoryMemory, Memory, SignalManager, SignalPolicy};
use agora_capacity::{
    CapacityContainer, CapacityContext, CapacityError, CapacityExecutor, ImplementationKind,
    Invocation,
};
use agora_types::{
    CapacityId, CapacityTaskId, Credentials, GroupAddress, PlayerAddress, RoleAddress, RoleTypeId,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of invoking a capacity through a player
#[derive(Debug)]
pub enum CapacityCall {
    /// Ran inline; the context is final
    Completed(CapacityContext),
    /// Queued on the pool; wait with the task id
    Submitted(CapacityTaskId),
}

impl CapacityCall {
    pub fn task(&self) -> Option<CapacityTaskId> {
        match self {
            CapacityCall::Submitted(task) => Some(*task),
            CapacityCall::Completed(_) => None,
        }
    }
}

pub struct RolePlayer {
    address: PlayerAddress,
    memory: Arc<dyn Memory>,
    signals: Arc<SignalManager>,
    capacities: CapacityContainer,
    executor: Arc<CapacityExecutor>,
    groups: Arc<GroupRepository>,
    activator: RoleActivator,
    credentials: RwLock<Option<Credentials>>,
    listeners: RwLock<Vec<Arc<dyn PlayerListener>>>,
    roles: RwLock<BTreeSet<RoleAddress>>,
    migrated: AtomicBool,
}

impl RolePlayer {
    pub(crate) fn new(
        address: PlayerAddress,
        executor: Arc<CapacityExecutor>,
        groups: Arc<GroupRepository>,
        signal_policy: SignalPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            memory: Arc::new(InMemoryMemory::new()),
            signals: Arc::new(SignalManager::new(signal_policy)),
            capacities: CapacityContainer::new(),
            executor,
            groups,
            activator: RoleActivator::new(),
            credentials: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            roles: RwLock::new(BTreeSet::new()),
            migrated: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &PlayerAddress {
        &self.address
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    pub fn signals(&self) -> &Arc<SignalManager> {
        &self.signals
    }

    pub fn capacities(&self) -> &CapacityContainer {
        &self.capacities
    }

    pub fn activator(&self) -> &RoleActivator {
        &self.activator
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }

    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials;
    }

    pub fn add_listener(&self, listener: Arc<dyn PlayerListener>) {
        self.listeners.write().push(listener);
    }

    /// Roles of a migrated player are no longer scheduled here
    pub fn is_migrated(&self) -> bool {
        self.migrated.load(Ordering::SeqCst)
    }

    pub fn set_migrated(&self, migrated: bool) {
        self.migrated.store(migrated, Ordering::SeqCst);
    }

    /// Request a role built by the organization's constructor
    pub fn request_role(
        self: &Arc<Self>,
        group: &Arc<KernelScopeGroup>,
        role_type: &RoleTypeId,
        init_args: Vec<Value>,
    ) -> KernelResult<RoleGrant> {
        group.request_role(self, role_type, None, init_args)
    }

    pub fn request_role_with(
        self: &Arc<Self>,
        group: &Arc<KernelScopeGroup>,
        role_type: &RoleTypeId,
        factory: &dyn RoleFactory,
        init_args: Vec<Value>,
    ) -> KernelResult<RoleGrant> {
        group.request_role(self, role_type, Some(factory), init_args)
    }

    pub fn leave_role(&self, group: &GroupAddress, role_type: &RoleTypeId) -> bool {
        self.groups
            .resolve(group)
            .map(|g| g.leave_role(&self.address, role_type))
            .unwrap_or(false)
    }

    /// Leave every role in every group. True if at least one was left.
    pub fn leave_all_roles(&self) -> bool {
        let groups: HashSet<GroupAddress> = self
            .roles
            .read()
            .iter()
            .map(|role| role.group().clone())
            .collect();
        groups.iter().fold(false, |left, address| {
            let released = self
                .groups
                .resolve(address)
                .map(|g| g.leave_all_roles(&self.address))
                .unwrap_or(false);
            released || left
        })
    }

    pub fn roles(&self) -> Vec<RoleAddress> {
        self.roles.read().iter().cloned().collect()
    }

    pub fn plays(&self, group: &GroupAddress, role_type: &RoleTypeId) -> bool {
        self.roles
            .read()
            .iter()
            .any(|role| role.group() == group && role.role_type() == role_type)
    }

    /// One scheduling pass over this player's roles
    pub async fn run_once(&self) -> ActivationReport {
        self.activator.run_once().await
    }

    /// Invoke a capacity as the player itself
    pub async fn call_capacity(
        &self,
        capacity: &CapacityId,
        inputs: Vec<Value>,
    ) -> KernelResult<CapacityCall> {
        self.invoke(capacity, Invocation::new(self.address.clone(), inputs))
            .await
    }

    pub(crate) async fn call_capacity_from(
        &self,
        role: &RoleAddress,
        capacity: &CapacityId,
        inputs: Vec<Value>,
    ) -> KernelResult<CapacityCall> {
        self.invoke(capacity, Invocation::from_role(role.clone(), inputs))
            .await
    }

    async fn invoke(
        &self,
        capacity: &CapacityId,
        invocation: Invocation,
    ) -> KernelResult<CapacityCall> {
        let implementation = self.capacities.implementation(capacity)?;
        match implementation.kind() {
            ImplementationKind::DirectAtomic => {
                let ctx = self
                    .executor
                    .execute_immediately(capacity, implementation.as_ref(), invocation)?;
                Ok(CapacityCall::Completed(ctx))
            }
            ImplementationKind::Standard => {
                let task = self.executor.submit(capacity, implementation, invocation).await?;
                debug!(
                    player = %self.address,
                    capacity = %capacity,
                    task = %task,
                    "Capacity submitted"
                );
                Ok(CapacityCall::Submitted(task))
            }
        }
    }

    pub async fn wait_capacity(
        &self,
        task: CapacityTaskId,
        timeout: Option<Duration>,
    ) -> Option<CapacityContext> {
        self.executor.wait_result(&self.address, task, timeout).await
    }

    pub fn has_capacity_result(&self, task: CapacityTaskId) -> bool {
        self.executor.has_result(&self.address, task)
    }

    pub fn capacity_result(&self, task: CapacityTaskId) -> Option<CapacityContext> {
        self.executor.instant_result(&self.address, task)
    }

    pub fn complete_capacity(&self, task: CapacityTaskId, outputs: Vec<Value>) -> bool {
        self.executor.done(&self.address, task, outputs)
    }

    pub fn cancel_capacity(&self, task: CapacityTaskId, reason: Option<CapacityError>) -> bool {
        self.executor.cancel(&self.address, task, reason)
    }

    /// Drop every pending capacity result of this player
    pub fn clear_capacity_results(&self) -> usize {
        self.executor.clear(&self.address)
    }

    pub(crate) fn role_obtained(&self, role: &Arc<RoleInstance>) {
        let address = role.address().clone();
        self.roles.write().insert(address.clone());
        self.activator.add(Arc::clone(role));
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.role_obtained(&self.address, &address);
        }
    }

    pub(crate) fn role_released(&self, role: &RoleAddress) {
        self.roles.write().remove(role);
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.role_released(&self.address, role);
        }
        if self.roles.read().is_empty() {
            info!(player = %self.address, "Player plays no role any more");
        }
    }
}

impl fmt::Debug for RolePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RolePlayer")
            .field("address", &self.address)
            .field("roles", &self.roles.read().len())
            .field("migrated", &self.is_migrated())
            .finish()
    }
}
