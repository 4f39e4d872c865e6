//! Capacity implementations

use crate::context::{CapacityContext, ImplementationKind};
use crate::error::CapacityResult;
use crate::prototype::CapacityPrototype;
use agora_types::CapacityId;

/// A pluggable unit of behaviour serving one capacity.
///
/// `call` runs either on the caller's thread or on a pool worker, so it
/// must not assume an async context.
pub trait CapacityImplementation: Send + Sync {
    fn prototype(&self) -> &CapacityPrototype;

    fn kind(&self) -> ImplementationKind {
        ImplementationKind::Standard
    }

    /// Read inputs from `ctx`, push outputs into it.
    fn call(&self, ctx: &mut CapacityContext) -> CapacityResult<()>;

    fn capacity(&self) -> &CapacityId {
        &self.prototype().capacity
    }
}

/// Implementation backed by a closure
pub struct FnCapacity<F> {
    prototype: CapacityPrototype,
    kind: ImplementationKind,
    body: F,
}

impl<F> FnCapacity<F>
where
    F: Fn(&mut CapacityContext) -> CapacityResult<()> + Send + Sync,
{
    pub fn new(prototype: CapacityPrototype, body: F) -> Self {
        Self {
            prototype,
            kind: ImplementationKind::Standard,
            body,
        }
    }

    pub fn atomic(mut self) -> Self {
        self.kind = ImplementationKind::DirectAtomic;
        self
    }
}

impl<F> CapacityImplementation for FnCapacity<F>
where
    F: Fn(&mut CapacityContext) -> CapacityResult<()> + Send + Sync,
{
    fn prototype(&self) -> &CapacityPrototype {
        &self.prototype
    }

    fn kind(&self) -> ImplementationKind {
        self.kind
    }

    fn call(&self, ctx: &mut CapacityContext) -> CapacityResult<()> {
        (self.body)(ctx)
    }
}
