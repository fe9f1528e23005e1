//! The running instance: config entries, their clients, and the pollers
//! feeding entity states

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_components::redfish_power::{
    self, sensor, DeviceConfig, PollError, RedfishPowerConfig, RedfishPowerConfigFlow,
    RedfishPowerHub, RedfishPowerSensor, SetupError, DOMAIN,
};
use ha_config_entries::{
    ConfigEntries, ConfigEntriesResult, ConfigEntrySource, ConfigEntryState, ConfigFlowHandler,
    FlowResultType, RuntimeRegistry,
};
use ha_core::EntityId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::states::StateStore;

/// Slack on top of the request timeout before an update is abandoned
const UPDATE_GRACE: Duration = Duration::from_secs(1);

/// The central Home Assistant instance
pub struct HomeAssistant {
    pub config_entries: ConfigEntries,
    pub states: Arc<StateStore>,
    hubs: RuntimeRegistry<RedfishPowerHub>,
    scan_interval: Duration,
    request_timeout: Duration,
    /// entry_id -> polling tasks
    pollers: DashMap<String, Vec<JoinHandle<()>>>,
    /// entry_id -> entities it created
    entities: DashMap<String, Vec<EntityId>>,
}

impl HomeAssistant {
    pub fn new(config: &RedfishPowerConfig) -> Self {
        Self {
            config_entries: ConfigEntries::new(),
            states: Arc::new(StateStore::new()),
            hubs: RuntimeRegistry::new(),
            scan_interval: config.scan_interval(),
            request_timeout: config.request_timeout(),
            pollers: DashMap::new(),
            entities: DashMap::new(),
        }
    }

    /// Run the import flow for each configured device and add the entries
    /// it creates. Returns the ids of the added entries.
    pub async fn import_devices(&self, devices: &[DeviceConfig]) -> Vec<String> {
        let flow = RedfishPowerConfigFlow::new(self.request_timeout);
        let mut added = Vec::new();

        for device in devices {
            let host = device.host.trim();
            if self.config_entries.get_by_unique_id(DOMAIN, host).is_some() {
                debug!("{} is already configured", host);
                continue;
            }

            let import_data = match serde_json::to_value(device) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Cannot import {}: {}", host, e);
                    continue;
                }
            };

            let result = match flow.async_step_import(import_data).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Invalid configuration for {}: {}", host, e);
                    continue;
                }
            };

            if result.result_type != FlowResultType::CreateEntry {
                warn!(
                    "Import of {} aborted: {}",
                    host,
                    result.reason.as_deref().unwrap_or("unknown")
                );
                continue;
            }

            let Some(entry) = result.into_config_entry(ConfigEntrySource::Import) else {
                continue;
            };
            match self.config_entries.add(entry) {
                Ok(entry) => added.push(entry.entry_id),
                Err(e) => warn!("Cannot add entry for {}: {}", host, e),
            }
        }

        added
    }

    /// Set up an entry and start polling its sensors
    pub async fn setup_entry(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let hubs = &self.hubs;
        let request_timeout = self.request_timeout;
        let mut sensors = Vec::new();
        let created = &mut sensors;

        self.config_entries
            .setup(entry_id, |entry| async move {
                redfish_power::async_setup_entry(&entry, hubs, request_timeout).await?;
                match sensor::async_setup_entry(&entry, hubs).await {
                    Ok(mut entities) => {
                        self.claim_entity_ids(&entry.entry_id, &mut entities);
                        *created = entities;
                        Ok::<(), SetupError>(())
                    }
                    Err(e) => {
                        redfish_power::async_unload_entry(&entry, hubs).await?;
                        Err(e)
                    }
                }
            })
            .await?;

        let budget = self.request_timeout + UPDATE_GRACE;
        let mut tasks = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            tasks.push(tokio::spawn(poll_sensor(
                sensor,
                Arc::clone(&self.states),
                self.scan_interval,
                budget,
            )));
        }
        self.pollers.insert(entry_id.to_string(), tasks);
        Ok(())
    }

    /// Give each sensor an entity id no other entry holds, numbering
    /// duplicates `_2`, `_3` and so on, and record them for the entry
    fn claim_entity_ids(&self, entry_id: &str, sensors: &mut [RedfishPowerSensor]) {
        let mut taken: HashSet<EntityId> = self
            .entities
            .iter()
            .flat_map(|ids| ids.value().clone())
            .collect();

        let mut claimed = Vec::with_capacity(sensors.len());
        for sensor in sensors.iter_mut() {
            let base = sensor.entity_id().clone();
            let mut candidate = base.clone();
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = base.numbered(n);
                n += 1;
            }
            if candidate != base {
                warn!("{} is already in use, registering {} instead", base, candidate);
                sensor.set_entity_id(candidate.clone());
            }
            taken.insert(candidate.clone());
            claimed.push(candidate);
        }
        self.entities.insert(entry_id.to_string(), claimed);
    }

    /// Stop an entry's pollers, drop its states and unload it
    pub async fn unload_entry(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        if let Some((_, tasks)) = self.pollers.remove(entry_id) {
            for task in tasks {
                task.abort();
                let _ = task.await;
            }
        }
        if let Some((_, entity_ids)) = self.entities.remove(entry_id) {
            for entity_id in &entity_ids {
                self.states.remove(entity_id);
            }
        }

        let hubs = &self.hubs;
        self.config_entries
            .unload(entry_id, |entry| async move {
                redfish_power::async_unload_entry(&entry, hubs).await
            })
            .await
    }

    /// Set up every entry that is not loaded yet. Returns how many loaded.
    pub async fn setup_all(&self) -> usize {
        let pending: Vec<String> = self
            .config_entries
            .iter()
            .filter(|entry| entry.state == ConfigEntryState::NotLoaded)
            .map(|entry| entry.entry_id)
            .collect();

        let mut loaded = 0;
        for entry_id in pending {
            match self.setup_entry(&entry_id).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Entry {} not loaded: {}", entry_id, e),
            }
        }
        loaded
    }

    /// Unload every entry
    pub async fn shutdown(&self) {
        for entry_id in self.config_entries.entry_ids() {
            if let Err(e) = self.unload_entry(&entry_id).await {
                warn!("Failed to unload entry {}: {}", entry_id, e);
            }
        }
    }
}

/// Poll one sensor every `scan_interval` until aborted.
///
/// Ticks missed while an update is still running are skipped, so updates of
/// one sensor never overlap.
async fn poll_sensor(
    mut sensor: RedfishPowerSensor,
    states: Arc<StateStore>,
    scan_interval: Duration,
    budget: Duration,
) {
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let outcome = tokio::time::timeout(budget, sensor.async_update()).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                sensor.mark_unavailable();
                Err(PollError::TimedOut(budget))
            }
        };
        if let Err(e) = result {
            warn!("Update of {} failed: {}", sensor.entity_id(), e);
        }

        let (state, changed) = states.set(
            sensor.entity_id().clone(),
            sensor.state_value(),
            sensor.state_attributes(),
        );
        if changed {
            info!("{} changed to {}", state.entity_id, state.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_components::redfish_power::hub::{
        CHASSIS_POWER_PATH, MANAGER_ETHERNET_PATH, SERVICE_ROOT_PATH, SYSTEM_PATH,
    };
    use ha_components::redfish_power::{ConnectionConfig, Password, PowerSchema};
    use mockito::{Server, ServerGuard};
    use serde_json::json;

    async fn mock_bmc(server: &mut ServerGuard, hostname: &str, watts: i64) {
        server
            .mock("GET", SERVICE_ROOT_PATH)
            .with_status(200)
            .with_body(json!({"@odata.type": "#ServiceRoot.v1_9_0.ServiceRoot"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", SYSTEM_PATH)
            .with_status(200)
            .with_body(
                json!({"@odata.type": "#ComputerSystem.v1_3_0.ComputerSystem"}).to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", MANAGER_ETHERNET_PATH)
            .with_status(200)
            .with_body(json!({"HostName": hostname}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(json!({"PowerControl": [{"PowerConsumedWatts": watts}]}).to_string())
            .create_async()
            .await;
    }

    fn device(host: String) -> DeviceConfig {
        DeviceConfig {
            host,
            username: "admin".to_string(),
            password: Password::new("x"),
            power_schema: None,
        }
    }

    fn config() -> RedfishPowerConfig {
        RedfishPowerConfig {
            scan_interval: 1,
            request_timeout: 5,
            devices: Vec::new(),
        }
    }

    async fn wait_for_state(hass: &HomeAssistant, entity_id: &str) -> Option<String> {
        for _ in 0..50 {
            if let Some(state) = hass.states.get(entity_id) {
                return Some(state.state);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_import_setup_poll_and_shutdown() {
        let mut server = Server::new_async().await;
        mock_bmc(&mut server, "rack_a", 182).await;

        let hass = HomeAssistant::new(&config());
        let devices = vec![device(server.url()), device(server.url())];
        let added = hass.import_devices(&devices).await;
        assert_eq!(added.len(), 1, "duplicate host must be skipped");

        assert_eq!(hass.setup_all().await, 1);
        let entry = hass.config_entries.get(&added[0]).unwrap();
        assert_eq!(entry.state, ConfigEntryState::Loaded);
        assert_eq!(entry.title, "rack_a");

        assert_eq!(
            wait_for_state(&hass, "sensor.rack_a_power_consumption")
                .await
                .as_deref(),
            Some("182")
        );

        hass.shutdown().await;
        assert!(hass.states.is_empty());
        assert_eq!(
            hass.config_entries.get(&added[0]).unwrap().state,
            ConfigEntryState::NotLoaded
        );
    }

    #[tokio::test]
    async fn test_failed_import_adds_no_entry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let hass = HomeAssistant::new(&config());
        assert!(hass.import_devices(&[device(host)]).await.is_empty());
        assert!(hass.config_entries.is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_marks_entry() {
        let mut server = Server::new_async().await;
        mock_bmc(&mut server, "rack_a", 182).await;

        let hass = HomeAssistant::new(&config());
        let added = hass.import_devices(&[device(server.url())]).await;
        assert_eq!(added.len(), 1);

        server.reset();
        server
            .mock("GET", MANAGER_ETHERNET_PATH)
            .with_status(200)
            .with_body(json!({"HostName": "rack_a"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", CHASSIS_POWER_PATH)
            .with_status(200)
            .with_body(json!({"PowerControl": []}).to_string())
            .create_async()
            .await;

        assert!(hass.setup_entry(&added[0]).await.is_err());
        let entry = hass.config_entries.get(&added[0]).unwrap();
        assert_eq!(entry.state, ConfigEntryState::SetupError);
        assert!(hass.hubs.is_empty());
    }

    #[tokio::test]
    async fn test_colliding_hostnames_get_distinct_entities() {
        let mut first = Server::new_async().await;
        mock_bmc(&mut first, "Web-Server01", 100).await;
        let mut second = Server::new_async().await;
        mock_bmc(&mut second, "Web-Server02", 200).await;

        let hass = HomeAssistant::new(&config());
        let first_id = hass.import_devices(&[device(first.url())]).await.remove(0);
        let second_id = hass.import_devices(&[device(second.url())]).await.remove(0);
        hass.setup_entry(&first_id).await.unwrap();
        hass.setup_entry(&second_id).await.unwrap();

        assert_eq!(
            wait_for_state(&hass, "sensor.eberver_power_consumption")
                .await
                .as_deref(),
            Some("100")
        );
        assert_eq!(
            wait_for_state(&hass, "sensor.eberver_power_consumption_2")
                .await
                .as_deref(),
            Some("200")
        );

        hass.unload_entry(&first_id).await.unwrap();
        assert!(hass.states.get("sensor.eberver_power_consumption").is_none());
        assert_eq!(
            hass.states
                .get("sensor.eberver_power_consumption_2")
                .map(|state| state.state)
                .as_deref(),
            Some("200")
        );

        hass.shutdown().await;
        assert!(hass.states.is_empty());
    }

    #[tokio::test]
    async fn test_hung_update_marks_sensor_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let hub = RedfishPowerHub::new(
            ConnectionConfig::new(host, "admin", "x").with_timeout(Duration::from_secs(30)),
        )
        .unwrap();
        let sensor =
            RedfishPowerSensor::new("rack_a", Arc::new(hub), PowerSchema::PowerConsumedWatts)
                .unwrap();
        let states = Arc::new(StateStore::new());
        let poller = tokio::spawn(poll_sensor(
            sensor,
            Arc::clone(&states),
            Duration::from_secs(60),
            Duration::from_millis(200),
        ));

        let mut state = None;
        for _ in 0..50 {
            state = states.get("sensor.rack_a_power_consumption");
            if state.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        poller.abort();

        assert!(state.unwrap().is_unavailable());
    }
}
