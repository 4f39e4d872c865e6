//! Live role instances and their lifecycle

use super::{RoleBehavior, RoleContext, RoleMemory, RoleSignals, WakeCondition};
use crate::group::{GroupEvent, KernelScopeGroup};
use crate::player::RolePlayer;
use crate::services::Mailbox;
use agora_types::{Message, RoleAddress};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Lifecycle state of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleLifecycle {
    Created,
    Activated,
    Live,
    Sleeping,
    Releasing,
    Destroyed,
}

/// What one scheduling pass did with a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `live` ran
    Ran,
    /// Still asleep
    Sleeping,
    /// Not scheduled: migrated player or failed activation
    Cancelled,
    /// `end` ran (or the role was already gone); drop it from the schedule
    Ended,
}

/// A role played by a player in a group
pub struct RoleInstance {
    address: RoleAddress,
    group: Weak<KernelScopeGroup>,
    player: Weak<RolePlayer>,
    mailbox: Arc<dyn Mailbox>,
    memory: RoleMemory,
    signals: RoleSignals,
    behavior: tokio::sync::Mutex<Box<dyn RoleBehavior>>,
    lifecycle: Mutex<RoleLifecycle>,
    wake: Mutex<Option<WakeCondition>>,
    activated: AtomicBool,
    leave_requested: AtomicBool,
    subscribed: AtomicBool,
    events: Mutex<VecDeque<GroupEvent>>,
    init_args: Vec<Value>,
}

impl RoleInstance {
    pub(crate) fn new(
        address: RoleAddress,
        group: Weak<KernelScopeGroup>,
        player: &Arc<RolePlayer>,
        mailbox: Arc<dyn Mailbox>,
        behavior: Box<dyn RoleBehavior>,
        init_args: Vec<Value>,
    ) -> Arc<Self> {
        Arc::new(Self {
            memory: RoleMemory::new(Arc::clone(player.memory())),
            signals: RoleSignals::new(Arc::clone(player.signals()), address.clone()),
            address,
            group,
            player: Arc::downgrade(player),
            mailbox,
            behavior: tokio::sync::Mutex::new(behavior),
            lifecycle: Mutex::new(RoleLifecycle::Created),
            wake: Mutex::new(None),
            activated: AtomicBool::new(false),
            leave_requested: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            events: Mutex::new(VecDeque::new()),
            init_args,
        })
    }

    pub fn address(&self) -> &RoleAddress {
        &self.address
    }

    pub fn group(&self) -> Option<Arc<KernelScopeGroup>> {
        self.group.upgrade()
    }

    pub fn player(&self) -> Option<Arc<RolePlayer>> {
        self.player.upgrade()
    }

    pub fn mailbox(&self) -> &Arc<dyn Mailbox> {
        &self.mailbox
    }

    pub fn memory(&self) -> &RoleMemory {
        &self.memory
    }

    pub fn signals(&self) -> &RoleSignals {
        &self.signals
    }

    pub fn lifecycle(&self) -> RoleLifecycle {
        *self.lifecycle.lock()
    }

    pub fn init_args(&self) -> &[Value] {
        &self.init_args
    }

    /// Released roles are never scheduled again
    pub fn is_released(&self) -> bool {
        matches!(self.lifecycle(), RoleLifecycle::Releasing | RoleLifecycle::Destroyed)
    }

    pub(crate) fn deliver(&self, message: Message) -> bool {
        self.mailbox.add(message)
    }

    pub(crate) fn push_group_event(&self, event: GroupEvent) {
        if self.subscribed.load(Ordering::SeqCst) {
            self.events.lock().push_back(event);
        }
    }

    pub(crate) fn subscribe_group_events(&self) {
        self.subscribed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn unsubscribe_group_events(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
        self.events.lock().clear();
    }

    pub(crate) fn next_group_event(&self) -> Option<GroupEvent> {
        self.events.lock().pop_front()
    }

    /// Ask to leave the group once the current `live` pass is over
    pub(crate) fn request_leave(&self) {
        self.leave_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sleep(&self, condition: WakeCondition) {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, RoleLifecycle::Activated | RoleLifecycle::Live) {
            *self.wake.lock() = Some(condition);
            *lifecycle = RoleLifecycle::Sleeping;
        }
    }

    /// Move to `Releasing`; the activator runs `end` on its next pass.
    pub(crate) fn begin_release(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, RoleLifecycle::Releasing | RoleLifecycle::Destroyed) {
            return false;
        }
        *lifecycle = RoleLifecycle::Releasing;
        true
    }

    fn set_lifecycle(&self, next: RoleLifecycle) {
        *self.lifecycle.lock() = next;
    }

    /// Move from `from` to `to` unless something else changed the state
    fn advance(&self, from: RoleLifecycle, to: RoleLifecycle) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == from {
            *lifecycle = to;
        }
    }

    fn is_awake(&self) -> bool {
        let mut wake = self.wake.lock();
        let ready = wake
            .as_ref()
            .map(|condition| condition.is_satisfied(self.mailbox.as_ref()))
            .unwrap_or(true);
        if ready {
            *wake = None;
        }
        ready
    }

    /// One scheduling pass
    pub(crate) async fn cycle(self: &Arc<Self>) -> CycleOutcome {
        match self.lifecycle() {
            RoleLifecycle::Destroyed => return CycleOutcome::Ended,
            RoleLifecycle::Releasing => {
                self.finish().await;
                return CycleOutcome::Ended;
            }
            _ => {}
        }
        if self.player().map(|p| p.is_migrated()).unwrap_or(true) {
            return CycleOutcome::Cancelled;
        }

        let ctx = RoleContext::new(Arc::clone(self));
        let mut behavior = self.behavior.lock().await;

        if self.lifecycle() == RoleLifecycle::Created {
            self.set_lifecycle(RoleLifecycle::Activated);
            self.activated.store(true, Ordering::SeqCst);
            if let Err(err) = behavior.activate(&ctx, &self.init_args).await {
                drop(behavior);
                warn!(role = %self.address, error = %err, "Role activation failed");
                self.evict();
                return CycleOutcome::Cancelled;
            }
            self.advance(RoleLifecycle::Activated, RoleLifecycle::Live);
            debug!(role = %self.address, "Role activated");
        }

        if self.lifecycle() == RoleLifecycle::Sleeping {
            if !self.is_awake() {
                return CycleOutcome::Sleeping;
            }
            self.advance(RoleLifecycle::Sleeping, RoleLifecycle::Live);
        }
        if self.lifecycle() != RoleLifecycle::Live {
            return CycleOutcome::Cancelled;
        }

        self.mailbox.synchronize();
        if let Err(err) = behavior.live(&ctx).await {
            warn!(role = %self.address, error = %err, "Role behaviour failed, leaving");
            self.request_leave();
        }
        drop(behavior);

        self.memory.flush();
        self.signals.flush();
        if self.leave_requested.swap(false, Ordering::SeqCst) {
            self.leave_now();
        }
        CycleOutcome::Ran
    }

    fn leave_now(&self) {
        match self.group() {
            Some(group) => {
                if !group.leave_role(self.address.player(), self.address.role_type()) {
                    debug!(role = %self.address, "Leave request not granted");
                }
            }
            None => {
                self.begin_release();
            }
        }
    }

    /// Leave the group whatever its leave conditions say, then release
    fn evict(&self) {
        if let Some(group) = self.group() {
            group.evict_role(self.address.player(), self.address.role_type());
        }
        self.begin_release();
    }

    async fn finish(self: &Arc<Self>) {
        if self.activated.load(Ordering::SeqCst) {
            let ctx = RoleContext::new(Arc::clone(self));
            self.behavior.lock().await.end(&ctx).await;
        }
        self.destroy();
    }

    fn destroy(&self) {
        self.memory.flush();
        self.signals.flush();
        self.unsubscribe_group_events();
        self.address.unbind();
        self.set_lifecycle(RoleLifecycle::Destroyed);
        debug!(role = %self.address, "Role destroyed");
    }
}

impl fmt::Debug for RoleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleInstance")
            .field("address", &self.address)
            .field("lifecycle", &self.lifecycle())
            .field("pending_messages", &self.mailbox.len())
            .finish()
    }
}
