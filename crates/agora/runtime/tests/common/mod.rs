//! Shared fixtures for kernel integration tests
#![allow(dead_code)]

use agora_runtime::prelude::*;
use agora_types::MaxPlayers;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Behaviour that does nothing
#[derive(Default)]
pub struct Idle;

#[async_trait]
impl RoleBehavior for Idle {
    async fn live(&mut self, _ctx: &RoleContext) -> KernelResult<()> {
        Ok(())
    }
}

/// Meeting: one Initiator, any number of Attendees and their Reviewers
pub fn meeting(id: &OrganizationTypeId) -> KernelResult<Organization> {
    Ok(Organization::builder(id.clone())
        .role(
            RoleDefinition::new("Initiator")
                .with_default_behavior::<Idle>()
                .with_obtain_condition(MaxPlayers::of("Initiator", 1)),
        )
        .role(RoleDefinition::new("Attendee").with_default_behavior::<Idle>())
        .role(
            RoleDefinition::new("Reviewer")
                .with_parent("Attendee")
                .with_default_behavior::<Idle>(),
        )
        .build())
}

pub fn kernel() -> AgoraKernel {
    let kernel = AgoraKernel::new(KernelConfig::testing()).unwrap();
    kernel.register_organization("Meeting", meeting);
    kernel
}

pub fn role(name: &str) -> RoleTypeId {
    RoleTypeId::new(name)
}

/// Shared, ordered log of callback names
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub struct JournalGroupListener(pub Journal);

impl GroupListener for JournalGroupListener {
    fn on_group_event(&self, event: &GroupEvent) {
        let entry = match event {
            GroupEvent::RoleTaken(role) => format!("listener:taken:{}", role.role_type()),
            GroupEvent::RoleReleased(role) => format!("listener:released:{}", role.role_type()),
            GroupEvent::GroupRemoved(_) => "listener:removed".to_string(),
        };
        self.0.push(entry);
    }
}
