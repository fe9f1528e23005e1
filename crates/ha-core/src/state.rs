use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EntityId, STATE_UNAVAILABLE};

/// Snapshot of one entity. Equality ignores both timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// Entity the snapshot describes
    pub entity_id: EntityId,

    /// Rendered value, e.g. "182", "unknown" or "unavailable"
    pub state: String,

    /// Unit, device class and other metadata
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Last time `state` took a different value
    pub last_changed: DateTime<Utc>,

    /// Last write, changed or not
    pub last_updated: DateTime<Utc>,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// The next snapshot of the same entity
    pub fn with_update(&self, state: impl Into<String>, attributes: HashMap<String, Value>) -> Self {
        let mut next = Self::new(self.entity_id.clone(), state, attributes);
        if next.state == self.state {
            next.last_changed = self.last_changed;
        }
        next
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Typed attribute, `None` if missing or of another type
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        T::deserialize(self.attributes.get(key)?).ok()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        (&self.entity_id, &self.state, &self.attributes)
            == (&other.entity_id, &other.state, &other.attributes)
    }
}
