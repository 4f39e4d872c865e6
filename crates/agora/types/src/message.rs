//! Messages exchanged between roles
//!
//! The content of a message is opaque to the kernel. Routing only looks at
//! the sender and the recipient.

use crate::address::{GroupAddress, RoleAddress};
use crate::ids::{MessageId, RoleTypeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a message is for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// A specific role instance. If it is gone the router falls back to any
    /// live role of the same type (or a subtype) in the group.
    Role(RoleAddress),
    /// Any role of the given type (or a subtype) in the group.
    Type {
        group: GroupAddress,
        role_type: RoleTypeId,
    },
}

impl Recipient {
    pub fn group(&self) -> &GroupAddress {
        match self {
            Recipient::Role(address) => address.group(),
            Recipient::Type { group, .. } => group,
        }
    }

    pub fn role_type(&self) -> &RoleTypeId {
        match self {
            Recipient::Role(address) => address.role_type(),
            Recipient::Type { role_type, .. } => role_type,
        }
    }

    pub fn address(&self) -> Option<&RoleAddress> {
        match self {
            Recipient::Role(address) => Some(address),
            Recipient::Type { .. } => None,
        }
    }
}

/// A message between roles
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<RoleAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<Recipient>,
    /// Free-form message kind, used for filtered mailbox iteration
    kind: String,
    content: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: MessageId::generate(),
            sender: None,
            recipient: None,
            kind: kind.into(),
            content,
            created_at: Utc::now(),
        }
    }

    pub fn from_role(mut self, sender: RoleAddress) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn to_role(mut self, receiver: RoleAddress) -> Self {
        self.recipient = Some(Recipient::Role(receiver));
        self
    }

    pub fn to_type(mut self, group: GroupAddress, role_type: RoleTypeId) -> Self {
        self.recipient = Some(Recipient::Type { group, role_type });
        self
    }

    /// A new message addressed back to this message's sender.
    pub fn reply(&self, kind: impl Into<String>, content: serde_json::Value) -> Option<Message> {
        let sender = self.sender.clone()?;
        Some(Message::new(kind, content).to_role(sender))
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn sender(&self) -> Option<&RoleAddress> {
        self.sender.as_ref()
    }

    pub fn recipient(&self) -> Option<&Recipient> {
        self.recipient.as_ref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn content(&self) -> &serde_json::Value {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_sender(&mut self, sender: RoleAddress) {
        self.sender = Some(sender);
    }

    pub fn set_recipient(&mut self, recipient: Recipient) {
        self.recipient = Some(recipient);
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}
