//! Config entries
//!
//! An entry is one configured instance of an integration, such as a single
//! BMC for `redfish_power`. This crate tracks entries and their lifecycle,
//! defines the config flow interface that creates them and holds the
//! runtime objects integrations attach to loaded entries. Entries live in
//! memory only; persisting them is up to the host.

pub mod entry;
pub mod flow;
pub mod manager;
pub mod runtime;
pub mod state_machine;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
pub use flow::{ConfigFlowHandler, FlowError, FlowResult, FlowResultType, FormField};
pub use manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult};
pub use runtime::RuntimeRegistry;
pub use state_machine::InvalidTransition;
