//! Player signals
//!
//! Signals are fire-and-forget notifications emitted by roles and observed
//! by whoever listens on the player's [`SignalManager`].

use agora_types::RoleAddress;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// What happens to a fired signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPolicy {
    /// Deliver to listeners right away
    #[default]
    FireImmediately,
    /// Keep until taken or flushed
    StoreInQueue,
    /// Drop
    IgnoreAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub value: Value,
    pub source: Option<RoleAddress>,
    pub emitted_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            source: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn from_role(mut self, source: RoleAddress) -> Self {
        self.source = Some(source);
        self
    }
}

pub trait SignalListener: Send + Sync {
    fn on_signal(&self, signal: &Signal);
}

/// Publish/subscribe hub for signals
pub struct SignalManager {
    policy: RwLock<SignalPolicy>,
    queue: Mutex<VecDeque<Signal>>,
    listeners: RwLock<Vec<Arc<dyn SignalListener>>>,
}

impl SignalManager {
    pub fn new(policy: SignalPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            queue: Mutex::new(VecDeque::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> SignalPolicy {
        *self.policy.read()
    }

    /// Switching away from queueing does not flush the queue.
    pub fn set_policy(&self, policy: SignalPolicy) {
        *self.policy.write() = policy;
    }

    pub fn add_listener(&self, listener: Arc<dyn SignalListener>) {
        self.listeners.write().push(listener);
    }

    pub fn fire(&self, signal: Signal) {
        match self.policy() {
            SignalPolicy::FireImmediately => self.deliver(&signal),
            SignalPolicy::StoreInQueue => self.queue.lock().push_back(signal),
            SignalPolicy::IgnoreAll => {
                tracing::trace!(signal = %signal.name, "Signal ignored");
            }
        }
    }

    /// Oldest queued signal
    pub fn take_signal(&self) -> Option<Signal> {
        self.queue.lock().pop_front()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Deliver every queued signal to the listeners. Returns how many.
    pub fn flush(&self) -> usize {
        let pending: Vec<Signal> = self.queue.lock().drain(..).collect();
        for signal in &pending {
            self.deliver(signal);
        }
        pending.len()
    }

    fn deliver(&self, signal: &Signal) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_signal(signal);
        }
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new(SignalPolicy::default())
    }
}
