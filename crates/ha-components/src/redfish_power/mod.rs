//! Redfish Power integration
//!
//! Reports the power consumption of a server through the Redfish API of its
//! BMC as a sensor entity.
//!
//! # Configuration
//!
//! Entries are created through the config flow, or imported from YAML:
//!
//! ```yaml
//! redfish_power:
//!   scan_interval: 30
//!   request_timeout: 10
//!   devices:
//!     - host: 10.0.0.5
//!       username: admin
//!       password: !secret bmc_password
//!       power_schema: average_consumed_watts
//! ```
//!
//! `power_schema` is optional; when omitted the layout is detected once at
//! setup.

pub mod config_flow;
pub mod error;
pub mod hub;
pub mod models;
pub mod schema;
pub mod sensor;

use std::time::Duration;

use ha_config_entries::{ConfigEntry, RuntimeRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use config_flow::{validate_input, RedfishPowerConfigFlow, UserInput, ValidatedInput};
pub use error::{PollError, RedfishError, RedfishResult, SetupError};
pub use hub::{ConnectionConfig, Password, RedfishPowerHub, DEFAULT_REQUEST_TIMEOUT};
pub use schema::{OdataType, OdataTypeMatcher, PowerSchema};
pub use sensor::RedfishPowerSensor;

/// Integration domain
pub const DOMAIN: &str = "redfish_power";

/// Entity platforms this integration sets up
pub const PLATFORMS: &[&str] = &["sensor"];

/// Default polling interval in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 30;

/// `redfish_power:` section of configuration.yaml
#[derive(Debug, Clone, Deserialize)]
pub struct RedfishPowerConfig {
    /// Seconds between polls
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl RedfishPowerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

impl Default for RedfishPowerConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            request_timeout: default_request_timeout(),
            devices: Vec::new(),
        }
    }
}

/// One BMC listed under `devices:`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    pub username: String,
    pub password: Password,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_schema: Option<PowerSchema>,
}

/// Create the client for an entry and register it under the entry's id
pub async fn async_setup_entry(
    entry: &ConfigEntry,
    hubs: &RuntimeRegistry<RedfishPowerHub>,
    request_timeout: Duration,
) -> Result<(), SetupError> {
    let input = UserInput::from_entry(entry).map_err(|e| SetupError::Unknown(e.to_string()))?;
    let hub = RedfishPowerHub::new(input.connection_config(request_timeout))
        .map_err(|e| SetupError::Unknown(e.to_string()))?;

    debug!("Registering client for {} ({})", input.host, entry.entry_id);
    hubs.insert(entry.entry_id.clone(), hub);
    Ok(())
}

/// Drop the entry's client. Unloading an entry that holds none succeeds.
pub async fn async_unload_entry(
    entry: &ConfigEntry,
    hubs: &RuntimeRegistry<RedfishPowerHub>,
) -> Result<(), SetupError> {
    if hubs.remove(&entry.entry_id).is_some() {
        debug!("Released client for entry {}", entry.entry_id);
    }
    Ok(())
}
