//! Power consumption sensor

use std::collections::HashMap;
use std::sync::Arc;

use ha_config_entries::{ConfigEntry, RuntimeRegistry};
use ha_core::{
    attributes, EntityId, EntityIdError, SensorDeviceClass, SensorStateClass, State, UnitOfPower,
    STATE_UNAVAILABLE, STATE_UNKNOWN,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config_flow::UserInput;
use super::error::{PollError, SetupError};
use super::hub::RedfishPowerHub;
use super::schema::PowerSchema;

/// Suffix of the object_id and unique_id
pub const POWER_CONSUMPTION_KEY: &str = "power_consumption";

/// Consumed watts of one BMC
///
/// The power layout is fixed at construction; updates never look for a
/// different one.
#[derive(Debug)]
pub struct RedfishPowerSensor {
    hub: Arc<RedfishPowerHub>,
    entity_id: EntityId,
    unique_id: String,
    schema: PowerSchema,
    native_value: Option<i64>,
    available: bool,
}

impl RedfishPowerSensor {
    pub const NAME: &'static str = "Power Consumption";
    pub const DEVICE_CLASS: SensorDeviceClass = SensorDeviceClass::Power;
    pub const STATE_CLASS: SensorStateClass = SensorStateClass::Measurement;
    pub const UNIT: UnitOfPower = UnitOfPower::Watt;

    /// `hostname` names the entity, the hub's host makes it unique
    pub fn new(
        hostname: &str,
        hub: Arc<RedfishPowerHub>,
        schema: PowerSchema,
    ) -> Result<Self, EntityIdError> {
        let entity_id = EntityId::from_name(
            "sensor",
            &format!("{}_{}", hostname, POWER_CONSUMPTION_KEY),
            POWER_CONSUMPTION_KEY,
        )?;
        let unique_id = format!("{}_{}", hub.host(), POWER_CONSUMPTION_KEY);

        Ok(Self {
            hub,
            entity_id,
            unique_id,
            schema,
            native_value: None,
            available: true,
        })
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Rename the entity, e.g. when its id is already taken
    pub fn set_entity_id(&mut self, entity_id: EntityId) {
        self.entity_id = entity_id;
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn power_schema(&self) -> PowerSchema {
        self.schema
    }

    /// Last successfully read watts
    pub fn native_value(&self) -> Option<i64> {
        self.native_value
    }

    pub fn available(&self) -> bool {
        self.available
    }

    /// Poll the BMC once.
    ///
    /// On failure the previous value is kept, the sensor becomes
    /// unavailable and the error is returned.
    pub async fn async_update(&mut self) -> Result<i64, PollError> {
        match self.hub.get_power_consumption(self.schema).await {
            Ok(watts) => {
                if !self.available {
                    info!("{} is available again", self.entity_id);
                }
                self.native_value = Some(watts);
                self.available = true;
                Ok(watts)
            }
            Err(e) => {
                self.mark_unavailable();
                Err(PollError::Request(e))
            }
        }
    }

    /// Flag the sensor unavailable, keeping its last value
    pub fn mark_unavailable(&mut self) {
        if self.available {
            debug!("{} is now unavailable", self.entity_id);
        }
        self.available = false;
    }

    /// State value as shown to the user
    pub fn state_value(&self) -> String {
        match (self.available, self.native_value) {
            (false, _) => STATE_UNAVAILABLE.to_string(),
            (true, Some(watts)) => watts.to_string(),
            (true, None) => STATE_UNKNOWN.to_string(),
        }
    }

    pub fn state_attributes(&self) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert(attributes::FRIENDLY_NAME.to_string(), Value::from(Self::NAME));
        attrs.insert(
            attributes::UNIT_OF_MEASUREMENT.to_string(),
            Value::from(Self::UNIT.as_str()),
        );
        attrs.insert(
            attributes::DEVICE_CLASS.to_string(),
            Value::from(Self::DEVICE_CLASS.as_str()),
        );
        attrs.insert(
            attributes::STATE_CLASS.to_string(),
            Value::from(Self::STATE_CLASS.as_str()),
        );
        attrs
    }

    /// Current state snapshot
    pub fn state(&self) -> State {
        State::new(
            self.entity_id.clone(),
            self.state_value(),
            self.state_attributes(),
        )
    }
}

/// Create the sensors for a loaded entry.
///
/// Reads the host name, then pins the power layout: the one stored in the
/// entry if any, otherwise the one detected now.
pub async fn async_setup_entry(
    entry: &ConfigEntry,
    hubs: &RuntimeRegistry<RedfishPowerHub>,
) -> Result<Vec<RedfishPowerSensor>, SetupError> {
    let hub = hubs.get(&entry.entry_id).ok_or_else(|| {
        SetupError::Unknown(format!("no client loaded for entry {}", entry.entry_id))
    })?;
    let input = UserInput::from_entry(entry).map_err(|e| SetupError::Unknown(e.to_string()))?;

    let hostname = hub
        .get_device_hostname()
        .await
        .map_err(SetupError::from_request)?;

    let schema = match input.power_schema {
        Some(schema) => schema,
        None => hub
            .detect_power_schema()
            .await
            .map_err(SetupError::from_request)?,
    };

    let sensor = RedfishPowerSensor::new(&hostname, hub, schema).map_err(|e| {
        warn!("Cannot name sensor for '{}': {}", hostname, e);
        SetupError::Unknown(e.to_string())
    })?;
    info!(
        "Set up {} ({}) reading {}",
        sensor.entity_id(),
        sensor.unique_id(),
        schema
    );

    Ok(vec![sensor])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redfish_power::hub::{ConnectionConfig, CHASSIS_POWER_PATH};
    use serde_json::json;

    fn hub(host: &str) -> Arc<RedfishPowerHub> {
        Arc::new(RedfishPowerHub::new(ConnectionConfig::new(host, "admin", "x")).unwrap())
    }

    #[test]
    fn test_identity() {
        let sensor =
            RedfishPowerSensor::new("Web-Server01", hub("10.0.0.5"), PowerSchema::PowerConsumedWatts)
                .unwrap();
        assert_eq!(
            sensor.entity_id().to_string(),
            "sensor.eberver_power_consumption"
        );
        assert_eq!(sensor.unique_id(), "10.0.0.5_power_consumption");

        let sensor =
            RedfishPowerSensor::new("rack_a", hub("bmc.local"), PowerSchema::PowerConsumedWatts)
                .unwrap();
        assert_eq!(
            sensor.entity_id().to_string(),
            "sensor.rack_a_power_consumption"
        );
        assert_eq!(sensor.unique_id(), "bmc.local_power_consumption");
    }

    #[test]
    fn test_initial_state_and_attributes() {
        let sensor =
            RedfishPowerSensor::new("rack", hub("10.0.0.5"), PowerSchema::PowerConsumedWatts)
                .unwrap();
        assert_eq!(sensor.native_value(), None);

        let state = sensor.state();
        assert_eq!(state.state, STATE_UNKNOWN);
        assert_eq!(
            state.attribute::<String>("friendly_name").as_deref(),
            Some("Power Consumption")
        );
        assert_eq!(
            state.attribute::<String>("unit_of_measurement").as_deref(),
            Some("W")
        );
        assert_eq!(
            state.attribute::<String>("device_class").as_deref(),
            Some("power")
        );
        assert_eq!(
            state.attribute::<String>("state_class").as_deref(),
            Some("measurement")
        );
    }

    #[tokio::test]
    async fn test_update_failure_keeps_value() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(json!({"PowerControl": [{"PowerConsumedWatts": 182}]}).to_string())
            .create_async()
            .await;

        let mut sensor =
            RedfishPowerSensor::new("rack", hub(&server.url()), PowerSchema::PowerConsumedWatts)
                .unwrap();
        assert_eq!(sensor.async_update().await.unwrap(), 182);
        assert_eq!(sensor.state().state, "182");
        ok.remove_async().await;

        let _bad = server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(json!({"PowerControl": [{}]}).to_string())
            .create_async()
            .await;

        assert!(sensor.async_update().await.is_err());
        assert!(!sensor.available());
        assert_eq!(sensor.native_value(), Some(182));
        assert!(sensor.state().is_unavailable());
    }
}
