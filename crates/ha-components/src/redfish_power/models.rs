//! Redfish response payloads
//!
//! Only the members the integration reads are modelled; everything else in
//! a response is ignored.

use serde::Deserialize;
use serde_json::Value;

use super::schema::PowerSchema;

/// Used when the management interface reports no host name
pub const UNKNOWN_HOSTNAME: &str = "Unknown Hostname";

/// `GET /redfish/v1`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRootType {
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
}

/// `GET /redfish/v1/Systems/1`
#[derive(Debug, Clone, Deserialize)]
pub struct SystemType {
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
}

/// `GET /redfish/v1/Managers/1/EthernetInterfaces/1`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EthernetInterfaceInfo {
    #[serde(rename = "HostName", default)]
    pub host_name: Option<String>,
}

impl EthernetInterfaceInfo {
    /// Host name, or [`UNKNOWN_HOSTNAME`] when absent, null or empty
    pub fn hostname(&self) -> String {
        match self.host_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => UNKNOWN_HOSTNAME.to_string(),
        }
    }
}

/// A single power sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReading {
    pub watts: i64,
    pub schema: PowerSchema,
}

impl PowerReading {
    /// Read `GET /redfish/v1/Chassis/1/Power` using `schema`
    pub fn from_power(power: &Value, schema: PowerSchema) -> Option<Self> {
        schema
            .extract(power)
            .map(|watts| PowerReading { watts, schema })
    }
}
