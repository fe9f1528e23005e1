//! Runtime data registry
//!
//! Holds the live object an integration builds for each loaded entry (an
//! API client, a session), keyed by entry_id. The host owns the registry
//! and passes it by reference to the integration's setup, update and
//! unload entry points.

use std::sync::Arc;

use dashmap::DashMap;

/// entry_id -> runtime object
pub struct RuntimeRegistry<T> {
    items: DashMap<String, Arc<T>>,
}

impl<T> RuntimeRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Store the runtime object for an entry, returning any previous one
    pub fn insert(&self, entry_id: impl Into<String>, item: T) -> Option<Arc<T>> {
        self.items.insert(entry_id.into(), Arc::new(item))
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<T>> {
        self.items.get(entry_id).map(|r| Arc::clone(r.value()))
    }

    /// Drop the registry's handle; the object is released once the last
    /// outstanding `Arc` goes away
    pub fn remove(&self, entry_id: &str) -> Option<Arc<T>> {
        self.items.remove(entry_id).map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for RuntimeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
