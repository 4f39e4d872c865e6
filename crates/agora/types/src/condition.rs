//! Role obtain/leave conditions
//!
//! Conditions are predicates that explain themselves: a rejection is a
//! [`ConditionFailure`] value, not a boolean, so callers can log and branch
//! on the reason.

use crate::address::GroupAddress;
use crate::credentials::Credentials;
use crate::ids::{CapacityId, PlayerAddress, RoleTypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Why a role could not be obtained or left
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConditionFailure {
    #[error("role {role} requires capacity {capacity}, which the player does not provide")]
    CapacityMissing { role: RoleTypeId, capacity: CapacityId },

    #[error("role {role} requires the player to already play {required} in this group")]
    RoleMissing { role: RoleTypeId, required: RoleTypeId },

    #[error("role {role} accepts at most {max} players")]
    CardinalityExceeded { role: RoleTypeId, max: usize },

    #[error("role {role} needs at least {min} players, leaving is not allowed")]
    CardinalityTooLow { role: RoleTypeId, min: usize },

    #[error("membership rejected for role {role}: {reason}")]
    MembershipRejected { role: RoleTypeId, reason: String },

    #[error("player already plays role {role} in this group")]
    AlreadyPlaying { role: RoleTypeId },

    #[error("condition on role {role} failed: {reason}")]
    Custom { role: RoleTypeId, reason: String },
}

impl ConditionFailure {
    pub fn custom(role: &RoleTypeId, reason: impl Into<String>) -> Self {
        ConditionFailure::Custom {
            role: role.clone(),
            reason: reason.into(),
        }
    }

    pub fn role(&self) -> &RoleTypeId {
        match self {
            ConditionFailure::CapacityMissing { role, .. }
            | ConditionFailure::RoleMissing { role, .. }
            | ConditionFailure::CardinalityExceeded { role, .. }
            | ConditionFailure::CardinalityTooLow { role, .. }
            | ConditionFailure::MembershipRejected { role, .. }
            | ConditionFailure::AlreadyPlaying { role }
            | ConditionFailure::Custom { role, .. } => role,
        }
    }
}

/// Whether a role is being obtained or left
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionPhase {
    Obtain,
    Leave,
}

/// Snapshot handed to conditions. The group lock is not held while they
/// run, so a condition may query its own group.
#[derive(Clone, Copy, Debug)]
pub struct ConditionContext<'a> {
    pub phase: ConditionPhase,
    pub group: &'a GroupAddress,
    pub role_type: &'a RoleTypeId,
    pub player: &'a PlayerAddress,
    /// Role types the player currently plays in this group
    pub player_roles: &'a BTreeSet<RoleTypeId>,
    /// Players currently holding `role_type` here, local and remote
    pub role_holders: usize,
    /// Capacities provided by the player
    pub capacities: &'a [CapacityId],
    pub credentials: Option<&'a Credentials>,
}

/// A predicate gating role obtain or leave
pub trait Condition: Send + Sync {
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure>;

    fn describe(&self) -> String {
        "custom condition".to_string()
    }
}

/// Ordered list of conditions, evaluated until the first failure
#[derive(Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<Arc<dyn Condition>>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.push(Arc::new(condition));
        self
    }

    pub fn push(&mut self, condition: Arc<dyn Condition>) {
        self.conditions.push(condition);
    }

    pub fn extend(&mut self, other: &ConditionSet) {
        self.conditions.extend(other.conditions.iter().cloned());
    }

    pub fn clear(&mut self) {
        self.conditions.clear();
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        for condition in &self.conditions {
            condition.evaluate(ctx)?;
        }
        Ok(())
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.conditions.iter().map(|c| c.describe()).collect()
    }
}

impl fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptions()).finish()
    }
}

/// The player must provide a capacity
#[derive(Clone, Debug)]
pub struct HasCapacity(pub CapacityId);

impl Condition for HasCapacity {
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        if ctx.phase == ConditionPhase::Leave || ctx.capacities.contains(&self.0) {
            return Ok(());
        }
        Err(ConditionFailure::CapacityMissing {
            role: ctx.role_type.clone(),
            capacity: self.0.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("has capacity {}", self.0)
    }
}

/// The player must already play another role in the same group
#[derive(Clone, Debug)]
pub struct HasRole(pub RoleTypeId);

impl Condition for HasRole {
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        if ctx.phase == ConditionPhase::Leave || ctx.player_roles.contains(&self.0) {
            return Ok(());
        }
        Err(ConditionFailure::RoleMissing {
            role: ctx.role_type.clone(),
            required: self.0.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("plays {}", self.0)
    }
}

/// Upper bound on the players of a role.
///
/// With `role: None` the bound applies to whichever role is requested.
#[derive(Clone, Debug)]
pub struct MaxPlayers {
    pub role: Option<RoleTypeId>,
    pub max: usize,
}

impl MaxPlayers {
    pub fn of(role: impl Into<RoleTypeId>, max: usize) -> Self {
        Self {
            role: Some(role.into()),
            max,
        }
    }

    pub fn any(max: usize) -> Self {
        Self { role: None, max }
    }
}

impl Condition for MaxPlayers {
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        if ctx.phase == ConditionPhase::Leave {
            return Ok(());
        }
        if let Some(role) = &self.role {
            if role != ctx.role_type {
                return Ok(());
            }
        }
        if ctx.role_holders >= self.max {
            return Err(ConditionFailure::CardinalityExceeded {
                role: ctx.role_type.clone(),
                max: self.max,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.role {
            Some(role) => format!("at most {} players of {}", self.max, role),
            None => format!("at most {} players per role", self.max),
        }
    }
}

/// Lower bound on the players of a role, checked on leave
#[derive(Clone, Debug)]
pub struct MinPlayers {
    pub role: RoleTypeId,
    pub min: usize,
}

impl MinPlayers {
    pub fn of(role: impl Into<RoleTypeId>, min: usize) -> Self {
        Self {
            role: role.into(),
            min,
        }
    }
}

impl Condition for MinPlayers {
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        if ctx.phase == ConditionPhase::Obtain || &self.role != ctx.role_type {
            return Ok(());
        }
        if ctx.role_holders <= self.min {
            return Err(ConditionFailure::CardinalityTooLow {
                role: ctx.role_type.clone(),
                min: self.min,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("at least {} players of {}", self.min, self.role)
    }
}

/// Condition backed by a closure
pub struct FnCondition<F> {
    label: String,
    predicate: F,
}

impl<F> FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> Result<(), ConditionFailure> + Send + Sync,
{
    pub fn new(label: impl Into<String>, predicate: F) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> Result<(), ConditionFailure> + Send + Sync,
{
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> Result<(), ConditionFailure> {
        (self.predicate)(ctx)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
