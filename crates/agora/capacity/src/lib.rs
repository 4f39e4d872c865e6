//! Agora Capacities
//!
//! A capacity is a named behaviour contract ([`CapacityPrototype`]) that
//! players provide through one or more [`CapacityImplementation`]s. Roles
//! invoke capacities of their player, either inline or on the bounded
//! [`CapacityExecutor`] pool.
//!
//! Asynchronous results are owned: only the player that submitted a task can
//! wait for, complete or cancel it, and a result is handed out once.

#![deny(unsafe_code)]

mod container;
mod context;
mod error;
mod executor;
mod implementation;
mod prototype;

pub use container::*;
pub use context::*;
pub use error::*;
pub use executor::*;
pub use implementation::*;
pub use prototype::*;
