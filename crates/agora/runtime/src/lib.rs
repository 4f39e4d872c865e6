//! Agora Kernel
//!
//! Organizational multiagent runtime: players join typed groups, take roles
//! under conditions, exchange messages scoped by group and role type, and
//! invoke capacities on a bounded worker pool.
//!
//! # Example
//!
//! ```no_run
//! use agora_runtime::prelude::*;
//! use async_trait::async_trait;
//!
//! #[derive(Default)]
//! struct Initiator;
//!
//! #[async_trait]
//! impl RoleBehavior for Initiator {
//!     async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()> {
//!         while let Some(message) = ctx.next_message() {
//!             ctx.reply(&message, "ack", serde_json::json!(null))?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> KernelResult<()> {
//! let kernel = AgoraKernel::new(KernelConfig::default())?;
//! kernel.register_organization("Meeting", |id: &OrganizationTypeId| {
//!     Ok(Organization::builder(id.clone())
//!         .role(RoleDefinition::new("Initiator").with_default_behavior::<Initiator>())
//!         .build())
//! });
//!
//! let group = kernel.create_group("Meeting")?;
//! let alice = kernel.spawn_player(Some("alice"));
//! let grant = alice.request_role(&group, &RoleTypeId::new("Initiator"), vec![])?;
//! assert!(grant.is_granted());
//! kernel.run_once().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod group;
pub mod kernel;
pub mod organization;
pub mod player;
pub mod role;
pub mod services;
pub mod telemetry;

pub use error::{KernelError, KernelResult};
pub use kernel::{AgoraKernel, AgoraKernelBuilder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::KernelConfig;
    pub use crate::error::{KernelError, KernelResult};
    pub use crate::group::{GroupEvent, GroupListener, GroupOptions, KernelScopeGroup, RoleGrant};
    pub use crate::kernel::AgoraKernel;
    pub use crate::organization::{Organization, RoleDefinition, RoleFactory};
    pub use crate::player::{CapacityCall, RolePlayer};
    pub use crate::role::{RoleBehavior, RoleContext, WakeCondition};
    pub use agora_types::{
        CapacityId, ConditionFailure, GroupAddress, Message, OrganizationTypeId, PlayerAddress,
        RoleAddress, RoleTypeId,
    };
}
