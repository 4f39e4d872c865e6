//! Per-role views of the player's memory and signals.
//!
//! Writes made by a role during a cycle reach the player's shared services
//! when the cycle ends (and when the role is destroyed).

use crate::services::{Memory, Signal, SignalManager};
use agora_types::RoleAddress;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Buffered view of the player's memory
pub struct RoleMemory {
    backing: Arc<dyn Memory>,
    /// `None` marks a pending removal
    pending: Mutex<BTreeMap<String, Option<Value>>>,
}

impl RoleMemory {
    pub fn new(backing: Arc<dyn Memory>) -> Self {
        Self {
            backing,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Sees this role's own pending writes first
    pub fn get(&self, id: &str) -> Option<Value> {
        if let Some(pending) = self.pending.lock().get(id) {
            return pending.clone();
        }
        self.backing.get_memorized_data(id)
    }

    pub fn put(&self, id: impl Into<String>, value: Value) {
        self.pending.lock().insert(id.into(), Some(value));
    }

    pub fn remove(&self, id: impl Into<String>) {
        self.pending.lock().insert(id.into(), None);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Apply pending writes to the player's memory. Returns how many.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();
        for (id, value) in pending {
            match value {
                Some(value) => {
                    self.backing.put_memorized_data(&id, value);
                }
                None => {
                    self.backing.remove_memorized_data(&id);
                }
            }
        }
        count
    }
}

/// Buffered emitter into the player's signal manager
pub struct RoleSignals {
    manager: Arc<SignalManager>,
    source: RoleAddress,
    pending: Mutex<Vec<Signal>>,
}

impl RoleSignals {
    pub fn new(manager: Arc<SignalManager>, source: RoleAddress) -> Self {
        Self {
            manager,
            source,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, name: impl Into<String>, value: Value) {
        let signal = Signal::new(name, value).from_role(self.source.clone());
        self.pending.lock().push(signal);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let count = pending.len();
        for signal in pending {
            self.manager.fire(signal);
        }
        count
    }

    pub fn manager(&self) -> &Arc<SignalManager> {
        &self.manager
    }
}
