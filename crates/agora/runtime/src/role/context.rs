//! What a role behaviour can reach

use super::{RoleInstance, RoleMemory, RoleSignals, WakeCondition};
use crate::error::{KernelError, KernelResult};
use crate::group::{GroupEvent, KernelScopeGroup, RoleGrant};
use crate::player::{CapacityCall, RolePlayer};
use agora_capacity::CapacityContext;
use agora_types::{CapacityId, CapacityTaskId, Message, RoleAddress, RoleTypeId, RoutingError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Handle given to [`RoleBehavior`](super::RoleBehavior) callbacks
#[derive(Clone)]
pub struct RoleContext {
    role: Arc<RoleInstance>,
}

impl RoleContext {
    pub(crate) fn new(role: Arc<RoleInstance>) -> Self {
        Self { role }
    }

    pub fn address(&self) -> &RoleAddress {
        self.role.address()
    }

    pub fn role(&self) -> &Arc<RoleInstance> {
        &self.role
    }

    pub fn group(&self) -> KernelResult<Arc<KernelScopeGroup>> {
        self.role
            .group()
            .ok_or_else(|| KernelError::GroupRemoved(self.address().group().clone()))
    }

    pub fn player(&self) -> KernelResult<Arc<RolePlayer>> {
        self.role
            .player()
            .ok_or_else(|| KernelError::PlayerNotFound(self.address().player().clone()))
    }

    pub fn next_message(&self) -> Option<Message> {
        self.role.mailbox().remove_first()
    }

    pub fn peek_message(&self) -> Option<Message> {
        self.role.mailbox().first()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.role.mailbox().snapshot()
    }

    pub fn take_messages(&self) -> Vec<Message> {
        self.role.mailbox().drain()
    }

    pub fn take_messages_of(&self, kind: &str) -> Vec<Message> {
        self.role.mailbox().drain_kind(kind)
    }

    pub fn has_messages(&self) -> bool {
        !self.role.mailbox().is_empty()
    }

    /// Send from this role through its group
    pub fn send(&self, mut message: Message) -> KernelResult<RoleAddress> {
        message.set_sender(self.address().clone());
        self.group()?.send_message(message, false)
    }

    /// Send to any role of `role_type` in this role's group
    pub fn send_to(
        &self,
        role_type: impl Into<RoleTypeId>,
        kind: &str,
        content: Value,
    ) -> KernelResult<RoleAddress> {
        let group = self.address().group().clone();
        let message = Message::new(kind, content).to_type(group, role_type.into());
        self.send(message)
    }

    pub fn reply(&self, to: &Message, kind: &str, content: Value) -> KernelResult<RoleAddress> {
        let reply = to
            .reply(kind, content)
            .ok_or(RoutingError::UnspecifiedReceiver)?;
        self.send(reply)
    }

    /// Broadcast to every role of `role_type` here. Returns local deliveries.
    pub fn broadcast(
        &self,
        role_type: impl Into<RoleTypeId>,
        kind: &str,
        content: Value,
        include_self: bool,
    ) -> KernelResult<usize> {
        let message = Message::new(kind, content)
            .from_role(self.address().clone())
            .to_type(self.address().group().clone(), role_type.into());
        self.group()?.broadcast_message(message, include_self)
    }

    /// Leave the group when the current `live` pass returns
    pub fn leave_me(&self) {
        self.role.request_leave();
    }

    pub fn sleep(&self, duration: Duration) {
        self.role.sleep(WakeCondition::after(duration));
    }

    pub fn sleep_until(&self, condition: WakeCondition) {
        self.role.sleep(condition);
    }

    pub fn memory(&self) -> &RoleMemory {
        self.role.memory()
    }

    pub fn signals(&self) -> &RoleSignals {
        self.role.signals()
    }

    /// Invoke a capacity of the player on behalf of this role
    pub async fn call_capacity(
        &self,
        capacity: &CapacityId,
        inputs: Vec<Value>,
    ) -> KernelResult<CapacityCall> {
        self.player()?
            .call_capacity_from(self.address(), capacity, inputs)
            .await
    }

    pub async fn wait_capacity(
        &self,
        task: CapacityTaskId,
        timeout: Option<Duration>,
    ) -> KernelResult<Option<CapacityContext>> {
        Ok(self.player()?.wait_capacity(task, timeout).await)
    }

    pub fn capacity_result_ready(&self, task: CapacityTaskId) -> bool {
        self.role
            .player()
            .map(|player| player.has_capacity_result(task))
            .unwrap_or(false)
    }

    /// Start queueing membership events of this group
    pub fn subscribe_group_events(&self) {
        self.role.subscribe_group_events();
    }

    pub fn unsubscribe_group_events(&self) {
        self.role.unsubscribe_group_events();
    }

    pub fn next_group_event(&self) -> Option<GroupEvent> {
        self.role.next_group_event()
    }

    /// Have the player take another role, possibly in another group
    pub fn request_role(
        &self,
        group: &Arc<KernelScopeGroup>,
        role_type: impl Into<RoleTypeId>,
        init_args: Vec<Value>,
    ) -> KernelResult<RoleGrant> {
        self.player()?
            .request_role(group, &role_type.into(), init_args)
    }
}
