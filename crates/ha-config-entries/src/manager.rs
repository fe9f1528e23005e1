//! In-memory registry of config entries

use std::fmt::Display;
use std::future::Future;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState};
use crate::state_machine::InvalidTransition;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("no config entry {0}")]
    NotFound(String),

    #[error("{domain} already has an entry for {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("cannot unload an entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("setup failed: {0}")]
    SetupFailed(String),

    #[error("unload failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// All config entries of a running instance.
///
/// Setup and unload run one at a time across every entry, so an
/// integration never sees two of its entries changing state at once.
#[derive(Default)]
pub struct ConfigEntries {
    entries: DashMap<String, ConfigEntry>,
    /// (domain, unique_id) -> entry_id
    unique_ids: DashMap<(String, String), String>,
    lifecycle: Mutex<()>,
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|entry| entry.clone())
    }

    fn require(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        self.get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        let key = (domain.to_string(), unique_id.to_string());
        let entry_id = self.unique_ids.get(&key)?.clone();
        self.get(&entry_id)
    }

    /// Register `entry`. Fails if its domain already has the same unique_id.
    pub fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(unique_id) = &entry.unique_id {
            let key = (entry.domain.clone(), unique_id.clone());
            match self.unique_ids.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(ConfigEntriesError::AlreadyExists {
                        domain: entry.domain.clone(),
                        unique_id: unique_id.clone(),
                    })
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(entry.entry_id.clone());
                }
            }
        }

        info!("Added {} entry '{}' [{}]", entry.domain, entry.title, entry.entry_id);
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        Ok(entry)
    }

    fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("{} -> {:?}", entry_id, state);
        Ok(())
    }

    /// Run `setup` for the entry. Success leaves it `Loaded`, failure leaves
    /// it in `SetupError` with the error text as reason.
    pub async fn setup<F, Fut, E>(&self, entry_id: &str, setup: F) -> ConfigEntriesResult<()>
    where
        F: FnOnce(ConfigEntry) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let _guard = self.lifecycle.lock().await;

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;
        let entry = self.require(entry_id)?;

        if let Err(e) = setup(entry.clone()).await {
            let reason = e.to_string();
            warn!("Error setting up '{}' [{}]: {}", entry.title, entry_id, reason);
            self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
            return Err(ConfigEntriesError::SetupFailed(reason));
        }

        self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
        info!("Set up '{}' [{}]", entry.title, entry_id);
        Ok(())
    }

    /// Run `unload` for the entry.
    ///
    /// Unloading an entry that was never set up does nothing. A failed unload
    /// leaves the entry in `FailedUnload` for good.
    pub async fn unload<F, Fut, E>(&self, entry_id: &str, unload: F) -> ConfigEntriesResult<()>
    where
        F: FnOnce(ConfigEntry) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let _guard = self.lifecycle.lock().await;

        let entry = self.require(entry_id)?;
        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(()),
            state if !state.is_recoverable() => {
                return Err(ConfigEntriesError::CannotUnload(state))
            }
            _ => {}
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        if let Err(e) = unload(entry.clone()).await {
            let reason = e.to_string();
            warn!("Error unloading '{}' [{}]: {}", entry.title, entry_id, reason);
            self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()))?;
            return Err(ConfigEntriesError::UnloadFailed(reason));
        }

        self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded '{}' [{}]", entry.title, entry_id);
        Ok(())
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every entry
    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry> + '_ {
        self.entries.iter().map(|entry| entry.value().clone())
    }
}
