//! Typed access to top-level sections of configuration.yaml

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, ConfigResult};

/// The `homeassistant:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Instance name shown in logs
    pub name: String,
    pub time_zone: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "Home".to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        Ok(integration_config(yaml, "homeassistant")?.unwrap_or_default())
    }
}

/// Deserialize the top-level section `section`.
///
/// `Ok(None)` when it is absent. A bare `section:` with no body
/// deserializes like an empty mapping.
pub fn integration_config<T: DeserializeOwned>(
    yaml: &Value,
    section: &str,
) -> ConfigResult<Option<T>> {
    let body = match yaml {
        Value::Null => return Ok(None),
        Value::Mapping(root) => match root.get(section) {
            None => return Ok(None),
            Some(Value::Null) => Value::Mapping(Mapping::new()),
            Some(body) => body.clone(),
        },
        _ => {
            return Err(ConfigError::Section {
                section: section.to_string(),
                reason: "configuration root is not a mapping".to_string(),
            })
        }
    };

    serde_yaml::from_value(body)
        .map(Some)
        .map_err(|e| ConfigError::Section {
            section: section.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct PowerSection {
        scan_interval: Option<u64>,
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_core_section() {
        let config =
            CoreConfig::from_yaml(&yaml("homeassistant:\n  name: Rack A\n  time_zone: Europe/Berlin\n"))
                .unwrap();
        assert_eq!(config.name, "Rack A");
        assert_eq!(config.time_zone, "Europe/Berlin");

        let config = CoreConfig::from_yaml(&yaml("homeassistant:\n  name: Lab\n")).unwrap();
        assert_eq!(config.time_zone, "UTC");
    }

    #[test]
    fn test_missing_core_section_uses_defaults() {
        let config = CoreConfig::from_yaml(&yaml("redfish_power: {}\n")).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_section_lookup() {
        let root = yaml("redfish_power:\n  scan_interval: 15\n");
        let section: Option<PowerSection> = integration_config(&root, "redfish_power").unwrap();
        assert_eq!(section.unwrap().scan_interval, Some(15));

        let absent: Option<PowerSection> = integration_config(&root, "other").unwrap();
        assert!(absent.is_none());

        let bare: Option<PowerSection> =
            integration_config(&yaml("redfish_power:\n"), "redfish_power").unwrap();
        assert_eq!(bare, Some(PowerSection::default()));
    }

    #[test]
    fn test_section_shape_errors() {
        let result: ConfigResult<Option<PowerSection>> =
            integration_config(&yaml("redfish_power:\n  scan_interval: soon\n"), "redfish_power");
        assert!(matches!(result, Err(ConfigError::Section { section, .. }) if section == "redfish_power"));

        let result: ConfigResult<Option<PowerSection>> =
            integration_config(&yaml("- a\n- b\n"), "redfish_power");
        assert!(matches!(result, Err(ConfigError::Section { .. })));
    }
}
