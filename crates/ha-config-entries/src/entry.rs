//! A configured instance of an integration

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::state_machine::ConfigEntryState;
use crate::state_machine::InvalidTransition;

/// How an entry came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// The setup form
    #[default]
    User,
    /// A device listed in configuration.yaml
    Import,
}

/// One configured device or service.
///
/// `data` is what the config flow produced and is never modified afterwards.
/// `state` and `reason` are runtime bookkeeping and are not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// ULID
    pub entry_id: String,

    /// Owning integration, e.g. "redfish_power"
    pub domain: String,

    /// Display name shown for the entry
    pub title: String,

    /// Connection settings produced by the config flow
    #[serde(default)]
    pub data: HashMap<String, Value>,

    /// Layout version of `data`
    #[serde(default = "first_version")]
    pub version: u32,

    /// At most one entry per (domain, unique_id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Form or configuration.yaml
    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Lifecycle state, runtime only
    #[serde(skip)]
    pub state: ConfigEntryState,

    /// Why the last setup or unload failed
    #[serde(skip)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Bumped on every state change
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn first_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            version: first_version(),
            unique_id: None,
            source: ConfigEntrySource::default(),
            state: ConfigEntryState::default(),
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(self, data: HashMap<String, Value>) -> Self {
        Self { data, ..self }
    }

    pub fn with_unique_id(self, unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: Some(unique_id.into()),
            ..self
        }
    }

    pub fn with_source(self, source: ConfigEntrySource) -> Self {
        Self { source, ..self }
    }

    pub fn with_version(self, version: u32) -> Self {
        Self { version, ..self }
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Move to `state` if the lifecycle allows it, recording `reason`
    pub fn try_set_state(
        &mut self,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.try_transition(state)?;
        self.reason = reason;
        self.modified_at = Utc::now();
        Ok(())
    }
}
