//! Redfish schema version handling
//!
//! Vendors and firmware releases ship different minor revisions of the
//! same Redfish schema. Resource types are therefore matched structurally
//! (`#{Resource}.v{major}_{minor}_{patch}.{Resource}` with any minor)
//! instead of by string equality.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected `@odata.type` of a Redfish resource, minor version left open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdataType {
    pub resource: &'static str,
    pub major: u32,
    pub patch: u32,
}

/// `/redfish/v1`
pub const SERVICE_ROOT: OdataType = OdataType {
    resource: "ServiceRoot",
    major: 1,
    patch: 0,
};

/// `/redfish/v1/Systems/1`
pub const COMPUTER_SYSTEM: OdataType = OdataType {
    resource: "ComputerSystem",
    major: 1,
    patch: 0,
};

impl OdataType {
    /// Compile the matcher for this type
    pub fn matcher(&self) -> Result<OdataTypeMatcher, regex::Error> {
        let resource = regex::escape(self.resource);
        let pattern = Regex::new(&format!(
            r"^#{resource}\.v{major}_(\d+)_{patch}\.{resource}$",
            resource = resource,
            major = self.major,
            patch = self.patch,
        ))?;
        Ok(OdataTypeMatcher {
            expected: *self,
            pattern,
        })
    }
}

impl fmt::Display for OdataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{r}.v{}_*_{}.{r}",
            self.major,
            self.patch,
            r = self.resource
        )
    }
}

/// Compiled `@odata.type` matcher
#[derive(Debug, Clone)]
pub struct OdataTypeMatcher {
    expected: OdataType,
    pattern: Regex,
}

impl OdataTypeMatcher {
    pub fn expected(&self) -> OdataType {
        self.expected
    }

    /// Minor version of `odata_type` if it is a compatible revision
    pub fn matched_minor(&self, odata_type: &str) -> Option<u32> {
        self.pattern
            .captures(odata_type)
            .and_then(|caps| caps.get(1))
            .and_then(|minor| minor.as_str().parse().ok())
    }

    pub fn matches(&self, odata_type: &str) -> bool {
        self.matched_minor(odata_type).is_some()
    }
}

/// Where a BMC reports consumed watts in `/redfish/v1/Chassis/1/Power`
///
/// There is no negotiation for this in Redfish; a device is pinned to one
/// layout, either configured or detected once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSchema {
    /// `PowerControl[0].PowerConsumedWatts`
    PowerConsumedWatts,
    /// `PowerControl[0].PowerMetrics.AverageConsumedWatts`
    AverageConsumedWatts,
}

impl PowerSchema {
    /// Order in which detection tries the layouts
    pub const DETECTION_ORDER: [PowerSchema; 2] = [
        PowerSchema::PowerConsumedWatts,
        PowerSchema::AverageConsumedWatts,
    ];

    pub fn field_path(&self) -> &'static str {
        match self {
            PowerSchema::PowerConsumedWatts => "PowerControl[0].PowerConsumedWatts",
            PowerSchema::AverageConsumedWatts => {
                "PowerControl[0].PowerMetrics.AverageConsumedWatts"
            }
        }
    }

    /// Read the watts at this layout's path, and only there
    pub fn extract(&self, power: &Value) -> Option<i64> {
        let control = power.get("PowerControl")?.get(0)?;
        let watts = match self {
            PowerSchema::PowerConsumedWatts => control.get("PowerConsumedWatts")?,
            PowerSchema::AverageConsumedWatts => {
                control.get("PowerMetrics")?.get("AverageConsumedWatts")?
            }
        };
        json_integer(watts)
    }

    /// First layout present in `power`
    pub fn detect(power: &Value) -> Option<PowerSchema> {
        Self::DETECTION_ORDER
            .into_iter()
            .find(|schema| schema.extract(power).is_some())
    }
}

impl fmt::Display for PowerSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_path())
    }
}

/// Integer value, accepting floats with no fractional part (`182.0`)
fn json_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}
