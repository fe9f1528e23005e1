//! Sensor metadata shared by sensor platforms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class of a sensor, determines how the frontend renders it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDeviceClass {
    Power,
}

impl SensorDeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorDeviceClass::Power => "power",
        }
    }
}

/// State class of a sensor, used by long-term statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStateClass {
    /// Instantaneous reading
    Measurement,
}

impl SensorStateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStateClass::Measurement => "measurement",
        }
    }
}

/// Power units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOfPower {
    #[serde(rename = "W")]
    Watt,
}

impl UnitOfPower {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfPower::Watt => "W",
        }
    }
}

impl fmt::Display for SensorDeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SensorStateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UnitOfPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
