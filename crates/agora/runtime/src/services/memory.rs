//! Player memory

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A change in a memory
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    Added { id: String, value: Value },
    Changed { id: String, old: Value, new: Value },
    Removed { id: String, old: Value },
}

/// Observer of memory changes
pub trait MemoryListener: Send + Sync {
    fn on_memory_changed(&self, event: &MemoryEvent);
}

/// Key-value store shared by the roles of a player
pub trait Memory: Send + Sync {
    fn get_memorized_data(&self, id: &str) -> Option<Value>;

    /// Store `value`, returning the previous one
    fn put_memorized_data(&self, id: &str, value: Value) -> Option<Value>;

    fn remove_memorized_data(&self, id: &str) -> Option<Value>;

    fn is_memorized(&self, id: &str) -> bool {
        self.get_memorized_data(id).is_some()
    }

    fn add_memory_listener(&self, listener: Arc<dyn MemoryListener>);
}

/// In-process memory
#[derive(Default)]
pub struct InMemoryMemory {
    data: RwLock<HashMap<String, Value>>,
    listeners: RwLock<Vec<Arc<dyn MemoryListener>>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn notify(&self, event: MemoryEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_memory_changed(&event);
        }
    }
}

impl Memory for InMemoryMemory {
    fn get_memorized_data(&self, id: &str) -> Option<Value> {
        self.data.read().get(id).cloned()
    }

    fn put_memorized_data(&self, id: &str, value: Value) -> Option<Value> {
        let previous = self.data.write().insert(id.to_string(), value.clone());
        let event = match &previous {
            Some(old) => MemoryEvent::Changed {
                id: id.to_string(),
                old: old.clone(),
                new: value,
            },
            None => MemoryEvent::Added {
                id: id.to_string(),
                value,
            },
        };
        self.notify(event);
        previous
    }

    fn remove_memorized_data(&self, id: &str) -> Option<Value> {
        let removed = self.data.write().remove(id);
        if let Some(old) = &removed {
            self.notify(MemoryEvent::Removed {
                id: id.to_string(),
                old: old.clone(),
            });
        }
        removed
    }

    fn add_memory_listener(&self, listener: Arc<dyn MemoryListener>) {
        self.listeners.write().push(listener);
    }
}
