//! configuration.yaml loading
//!
//! Reads the YAML configuration with the custom tags Home Assistant users
//! expect (`!secret`, `!env_var`, `!include`) and hands out typed
//! top-level sections.
//!
//! ```ignore
//! let yaml = ha_config::load_yaml("/config", "configuration.yaml")?;
//! let core = ha_config::CoreConfig::from_yaml(&yaml)?;
//! let power: Option<RedfishPowerConfig> = ha_config::integration_config(&yaml, "redfish_power")?;
//! ```

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::{integration_config, CoreConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;
