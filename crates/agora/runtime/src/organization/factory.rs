//! Factories turning type names into live objects

use super::Organization;
use crate::error::KernelResult;
use crate::role::RoleBehavior;
use agora_types::{OrganizationTypeId, RoleTypeId};
use serde_json::Value;
use std::marker::PhantomData;

/// Creates role behaviours
pub trait RoleFactory: Send + Sync {
    fn new_instance(
        &self,
        role_type: &RoleTypeId,
        args: &[Value],
    ) -> KernelResult<Box<dyn RoleBehavior>>;
}

impl<F> RoleFactory for F
where
    F: Fn(&RoleTypeId, &[Value]) -> KernelResult<Box<dyn RoleBehavior>> + Send + Sync,
{
    fn new_instance(
        &self,
        role_type: &RoleTypeId,
        args: &[Value],
    ) -> KernelResult<Box<dyn RoleBehavior>> {
        self(role_type, args)
    }
}

/// Builds behaviours through `Default`
pub struct DefaultRoleFactory<B>(PhantomData<fn() -> B>);

impl<B> DefaultRoleFactory<B> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B> Default for DefaultRoleFactory<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> RoleFactory for DefaultRoleFactory<B>
where
    B: RoleBehavior + Default + 'static,
{
    fn new_instance(
        &self,
        _role_type: &RoleTypeId,
        _args: &[Value],
    ) -> KernelResult<Box<dyn RoleBehavior>> {
        Ok(Box::new(B::default()))
    }
}

/// Creates the organization instance of a type
pub trait OrganizationFactory: Send + Sync {
    fn new_instance(&self, type_id: &OrganizationTypeId) -> KernelResult<Organization>;
}

impl<F> OrganizationFactory for F
where
    F: Fn(&OrganizationTypeId) -> KernelResult<Organization> + Send + Sync,
{
    fn new_instance(&self, type_id: &OrganizationTypeId) -> KernelResult<Organization> {
        self(type_id)
    }
}
