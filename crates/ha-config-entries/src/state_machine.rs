//! Entry lifecycle
//!
//! ```text
//! NotLoaded ─▶ SetupInProgress ─▶ Loaded ─────┐
//!                    │  ▲                     ▼
//!                    ▼  │              UnloadInProgress ─▶ NotLoaded
//!                 SetupError ─────────────────┘        └─▶ FailedUnload
//! ```
//!
//! A failed setup stays in `SetupError` until someone sets it up again or
//! unloads it. `FailedUnload` is terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    SetupError,
    UnloadInProgress,
    FailedUnload,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("config entry cannot go from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
}

impl ConfigEntryState {
    /// States reachable in one step
    pub fn successors(self) -> &'static [ConfigEntryState] {
        use ConfigEntryState::*;
        match self {
            NotLoaded => &[SetupInProgress],
            SetupInProgress => &[Loaded, SetupError],
            Loaded => &[UnloadInProgress],
            SetupError => &[SetupInProgress, UnloadInProgress],
            UnloadInProgress => &[NotLoaded, FailedUnload],
            FailedUnload => &[],
        }
    }

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.successors().contains(&to)
    }

    pub fn try_transition(self, to: ConfigEntryState) -> Result<ConfigEntryState, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Whether an unload may be attempted from here
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ConfigEntryState::NotLoaded | ConfigEntryState::Loaded | ConfigEntryState::SetupError
        )
    }
}
