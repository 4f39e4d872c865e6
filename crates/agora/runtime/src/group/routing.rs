//! Message routing inside a group

use super::KernelScopeGroup;
use crate::error::KernelResult;
use crate::role::RoleInstance;
use agora_types::{Message, Recipient, RoleAddress, RoleTypeId, RoutingError};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

impl KernelScopeGroup {
    /// Deliver `message` to one role.
    ///
    /// A receiver address that no longer resolves falls back to any local
    /// role of the receiver type or one of its subtypes, picked by the
    /// group's selector, then to the distant handler. Returns the address
    /// the message went to.
    pub fn send_message(
        &self,
        message: Message,
        include_sender: bool,
    ) -> KernelResult<RoleAddress> {
        let (sender, recipient) = self.check_routable(&message)?;

        if let Some(target) = recipient.address() {
            if include_sender || target != &sender {
                if let Some(role) = self.resolve_role(target) {
                    self.deliver(&role, message);
                    return Ok(target.clone());
                }
            }
            debug!(
                group = %self.address,
                receiver = %target,
                "Receiver gone, selecting by role type"
            );
        }

        let candidates = self.candidates(recipient.role_type(), &sender, include_sender);
        let addresses: Vec<RoleAddress> = candidates.iter().map(|r| r.address().clone()).collect();
        if let Some(role) = self.selector.select(&addresses).and_then(|i| candidates.get(i)) {
            let receiver = role.address().clone();
            self.deliver(role, message);
            return Ok(receiver);
        }

        if let Some(remote) = self.remote() {
            if let Some(receiver) = remote.send_message(&self.address, &message) {
                self.telemetry.message_forwarded();
                debug!(
                    group = %self.address,
                    receiver = %receiver,
                    "Message forwarded to remote receiver"
                );
                return Ok(receiver);
            }
        }

        Err(RoutingError::ReceiverNotFound {
            role: recipient.role_type().clone(),
            group: self.address.clone(),
        }
        .into())
    }

    /// Deliver a copy of `message` to every local role of the receiver type
    /// and its subtypes. Distributed groups also forward once to the distant
    /// handler when the sender is a local member. Returns the number of
    /// local deliveries.
    pub fn broadcast_message(&self, message: Message, include_sender: bool) -> KernelResult<usize> {
        let (sender, recipient) = self.check_routable(&message)?;

        let candidates = self.candidates(recipient.role_type(), &sender, include_sender);
        for role in &candidates {
            self.deliver(role, message.clone());
        }

        let mut forwarded = false;
        if let Some(remote) = self.remote() {
            let sender_is_local = self
                .state
                .lock()
                .local_role(sender.role_type(), sender.player())
                .is_some();
            if sender_is_local {
                remote.broadcast_message(&self.address, &message);
                self.telemetry.message_forwarded();
                forwarded = true;
            }
        }

        if candidates.is_empty() && !forwarded {
            return Err(RoutingError::ReceiverNotFound {
                role: recipient.role_type().clone(),
                group: self.address.clone(),
            }
            .into());
        }
        debug!(
            group = %self.address,
            role = %recipient.role_type(),
            delivered = candidates.len(),
            forwarded,
            "Message broadcast"
        );
        Ok(candidates.len())
    }

    fn check_routable(&self, message: &Message) -> Result<(RoleAddress, Recipient), RoutingError> {
        let sender = message.sender().cloned().ok_or(RoutingError::UnspecifiedSender)?;
        let recipient = message.recipient().cloned().ok_or(RoutingError::UnspecifiedReceiver)?;
        if recipient.group() != &self.address {
            return Err(RoutingError::GroupMismatch {
                target: recipient.group().clone(),
                via: self.address.clone(),
            });
        }
        if !self.organization.defines(recipient.role_type()) {
            return Err(RoutingError::UndefinedRole {
                role: recipient.role_type().clone(),
                group: self.address.clone(),
            });
        }
        Ok((sender, recipient))
    }

    /// Live local role behind `address`, rebinding the address cache
    pub(crate) fn resolve_role(&self, address: &RoleAddress) -> Option<Arc<RoleInstance>> {
        if let Some(role) = address.resolve::<RoleInstance>() {
            if !role.is_released() {
                return Some(role);
            }
        }
        let role = self
            .state
            .lock()
            .local_role(address.role_type(), address.player())?;
        address.bind(&role);
        Some(role)
    }

    /// Local roles of `role_type` or a subtype, in address order
    fn candidates(
        &self,
        role_type: &RoleTypeId,
        sender: &RoleAddress,
        include_sender: bool,
    ) -> Vec<Arc<RoleInstance>> {
        let subtypes = self.organization.subtypes_of(role_type);
        let state = self.state.lock();
        subtypes
            .iter()
            .filter_map(|role| state.roles.get(role))
            .flat_map(|slot| slot.local.values())
            .filter(|role| include_sender || role.address() != sender)
            .cloned()
            .collect()
    }

    fn deliver(&self, role: &Arc<RoleInstance>, mut message: Message) {
        message.set_recipient(Recipient::Role(role.address().clone()));
        let id = message.id();
        role.deliver(message);
        self.state.lock().last_used = Utc::now();
        self.telemetry.message_delivered();
        debug!(
            group = %self.address,
            receiver = %role.address(),
            message = %id,
            "Message delivered"
        );
    }
}
