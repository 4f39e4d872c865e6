//! Invalidatable cache from an address to its live object.
//!
//! The canonical registries own the live objects. An address only keeps a
//! weak, type-erased pointer to the last resolution so repeated lookups skip
//! the registry. Clones of an address share the same cache cell.

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

type ErasedWeak = Weak<dyn Any + Send + Sync>;

/// Shared, weak, rebindable reference to a live object
#[derive(Clone, Default)]
pub struct LiveBinding {
    slot: Arc<RwLock<Option<ErasedWeak>>>,
}

impl LiveBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the cache at `target`, replacing any previous binding.
    pub fn bind<T: Any + Send + Sync>(&self, target: &Arc<T>) {
        let erased: Arc<dyn Any + Send + Sync> = target.clone();
        *self.slot.write() = Some(Arc::downgrade(&erased));
    }

    /// Clear the cache.
    pub fn unbind(&self) {
        *self.slot.write() = None;
    }

    /// Return the live object if still bound, alive and of type `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let weak = self.slot.read().as_ref()?.clone();
        weak.upgrade()?.downcast::<T>().ok()
    }

    pub fn is_bound(&self) -> bool {
        self.slot
            .read()
            .as_ref()
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Whether two handles share the same cache cell.
    pub fn shares_cell_with(&self, other: &LiveBinding) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for LiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveBinding")
            .field("bound", &self.is_bound())
            .finish()
    }
}
