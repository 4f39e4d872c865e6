//! User-provided role behaviour

use super::RoleContext;
use crate::error::KernelResult;
use async_trait::async_trait;
use serde_json::Value;

/// What a role does while it is played.
///
/// An error from `activate` or `live` makes the role leave its group.
#[async_trait]
pub trait RoleBehavior: Send + Sync {
    /// Runs once, on the first tick after the role was granted
    async fn activate(&mut self, _ctx: &RoleContext, _args: &[Value]) -> KernelResult<()> {
        Ok(())
    }

    /// Runs once per tick while the role is live and awake
    async fn live(&mut self, ctx: &RoleContext) -> KernelResult<()>;

    /// Runs on the tick after the role was released
    async fn end(&mut self, _ctx: &RoleContext) {}
}
