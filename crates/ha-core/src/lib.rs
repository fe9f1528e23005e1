//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the integrations and
//! the host: EntityId, State and the sensor metadata enums.

mod entity_id;
mod sensor;
mod state;

pub use entity_id::{filter_object_id, EntityId, EntityIdError};
pub use sensor::{SensorDeviceClass, SensorStateClass, UnitOfPower};
pub use state::State;

/// State value used before an entity has reported anything
pub const STATE_UNKNOWN: &str = "unknown";

/// State value used while an entity cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Standard attribute keys written by entities
pub mod attributes {
    pub const FRIENDLY_NAME: &str = "friendly_name";
    pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
    pub const DEVICE_CLASS: &str = "device_class";
    pub const STATE_CLASS: &str = "state_class";
}
