//! Capacity invocation context
//!
//! A context travels with one invocation: it carries the caller's identity,
//! the input and output slots and the final status. Asynchronous invocations
//! hand it back exactly once, to the player that submitted it.

use crate::error::{CapacityError, CapacityResult};
use agora_types::{CapacityId, CapacityTaskId, GroupAddress, PlayerAddress, RoleAddress};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How an implementation wants to be run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImplementationKind {
    /// May be queued on the worker pool
    #[default]
    Standard,
    /// Always runs inline on the caller's thread
    DirectAtomic,
}

/// Outcome of an invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallStatus {
    Pending,
    Succeeded,
    Failed(CapacityError),
    Cancelled(CapacityError),
}

/// Who invokes a capacity, from where, with which inputs
#[derive(Clone, Debug)]
pub struct Invocation {
    pub caller: PlayerAddress,
    pub group: Option<GroupAddress>,
    pub role: Option<RoleAddress>,
    pub inputs: Vec<Value>,
}

impl Invocation {
    pub fn new(caller: PlayerAddress, inputs: Vec<Value>) -> Self {
        Self {
            caller,
            group: None,
            role: None,
            inputs,
        }
    }

    /// Invocation issued by a role; the group is taken from its address.
    pub fn from_role(role: RoleAddress, inputs: Vec<Value>) -> Self {
        Self {
            caller: role.player().clone(),
            group: Some(role.group().clone()),
            role: Some(role),
            inputs,
        }
    }
}

/// Cancellation flag shared between a context and the executor
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one capacity invocation
#[derive(Clone, Debug)]
pub struct CapacityContext {
    id: CapacityTaskId,
    caller: PlayerAddress,
    group: Option<GroupAddress>,
    role: Option<RoleAddress>,
    capacity: CapacityId,
    kind: ImplementationKind,
    inputs: Vec<Value>,
    outputs: Vec<Value>,
    status: CallStatus,
    cancel: CancelFlag,
}

impl CapacityContext {
    pub fn new(capacity: CapacityId, kind: ImplementationKind, invocation: Invocation) -> Self {
        Self {
            id: CapacityTaskId::generate(),
            caller: invocation.caller,
            group: invocation.group,
            role: invocation.role,
            capacity,
            kind,
            inputs: invocation.inputs,
            outputs: Vec::new(),
            status: CallStatus::Pending,
            cancel: CancelFlag::new(),
        }
    }

    pub fn id(&self) -> CapacityTaskId {
        self.id
    }

    pub fn caller(&self) -> &PlayerAddress {
        &self.caller
    }

    pub fn group(&self) -> Option<&GroupAddress> {
        self.group.as_ref()
    }

    pub fn role(&self) -> Option<&RoleAddress> {
        self.role.as_ref()
    }

    pub fn capacity(&self) -> &CapacityId {
        &self.capacity
    }

    pub fn kind(&self) -> ImplementationKind {
        self.kind
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&Value> {
        self.inputs.get(index)
    }

    /// Input slot as i64, or a `CallFailed` naming the slot.
    pub fn input_i64(&self, index: usize) -> CapacityResult<i64> {
        self.input(index).and_then(Value::as_i64).ok_or_else(|| {
            CapacityError::CallFailed(format!(
                "input {} of {} is not an integer",
                index, self.capacity
            ))
        })
    }

    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&Value> {
        self.outputs.get(index)
    }

    pub fn push_output(&mut self, value: Value) {
        self.outputs.push(value);
    }

    pub fn set_outputs(&mut self, values: Vec<Value>) {
        self.outputs = values;
    }

    pub fn status(&self) -> &CallStatus {
        &self.status
    }

    pub fn is_done(&self) -> bool {
        !matches!(self.status, CallStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, CallStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CallStatus::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, CallStatus::Cancelled(_))
    }

    pub fn error(&self) -> Option<&CapacityError> {
        match &self.status {
            CallStatus::Failed(err) | CallStatus::Cancelled(err) => Some(err),
            _ => None,
        }
    }

    /// Whether someone asked this invocation to stop. Long-running
    /// implementations should poll this.
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn mark_succeeded(&mut self) {
        self.status = CallStatus::Succeeded;
    }

    pub fn mark_failed(&mut self, error: CapacityError) {
        self.status = CallStatus::Failed(error);
    }

    pub fn mark_cancelled(&mut self, error: CapacityError) {
        self.status = CallStatus::Cancelled(error);
    }

    /// Turn a finished context into a `Result`, for synchronous callers.
    pub fn into_result(self) -> CapacityResult<CapacityContext> {
        match &self.status {
            CallStatus::Failed(err) | CallStatus::Cancelled(err) => Err(err.clone()),
            CallStatus::Pending => Err(CapacityError::CallFailed(format!(
                "{} is still pending",
                self.id
            ))),
            CallStatus::Succeeded => Ok(self),
        }
    }
}
