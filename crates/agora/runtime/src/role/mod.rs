//! Roles: behaviours a player activates inside a group
//!
//! Lifecycle: `Created -> Activated -> Live -> Releasing -> Destroyed`, with
//! `Sleeping` as a detour from `Live` until the role's [`WakeCondition`]
//! holds. The owning player's activator drives every transition except the
//! move to `Releasing`, which the group makes when the role is left.

mod behavior;
mod buffers;
mod context;
mod instance;
mod wake;

pub use behavior::*;
pub use buffers::*;
pub use context::*;
pub use instance::*;
pub use wake::*;
