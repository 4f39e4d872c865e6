//! Agora Domain Types
//!
//! This crate defines the identities and values shared by the Agora
//! organizational runtime: who plays roles, where roles live, what they
//! send each other, and the conditions gating role acquisition.
//!
//! # Key Concepts
//!
//! - **Organization**: a catalog of role types, named by an
//!   [`OrganizationTypeId`].
//! - **Group**: a live instance of an organization, addressed by a
//!   [`GroupAddress`].
//! - **Role**: a behaviour a player activates inside a group, addressed by a
//!   [`RoleAddress`] = (group, role type, player).
//! - **Condition**: a predicate that explains a refusal with a
//!   [`ConditionFailure`].
//!
//! # Addresses and live objects
//!
//! Addresses are plain values. Each carries a weak [`LiveBinding`] cache to
//! the object it names; registries in `agora-runtime` own the objects and
//! rebind the cache on a miss.

#![deny(unsafe_code)]

mod address;
mod binding;
mod condition;
mod credentials;
mod errors;
mod ids;
mod message;

pub use address::*;
pub use binding::*;
pub use condition::*;
pub use credentials::*;
pub use errors::*;
pub use ids::*;
pub use message::*;
