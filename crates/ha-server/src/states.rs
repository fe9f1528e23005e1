//! Current entity states

use std::collections::HashMap;

use dashmap::DashMap;
use ha_core::{EntityId, State};
use tracing::debug;

/// Tracks the latest state of every entity the server polls
#[derive(Default)]
pub struct StateStore {
    states: DashMap<String, State>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of an entity.
    ///
    /// `last_changed` only moves when the state value differs from the
    /// stored one. Returns the new state and whether the value changed.
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> (State, bool) {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes),
            None => State::new(entity_id, state, attributes),
        };
        let changed = old_state
            .as_ref()
            .map(|s| s.state != new_state.state)
            .unwrap_or(true);

        debug!("Setting {} to {} (changed: {})", key, new_state.state, changed);
        self.states.insert(key, new_state.clone());
        (new_state, changed)
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        self.states
            .remove(&entity_id.to_string())
            .map(|(_, state)| state)
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
