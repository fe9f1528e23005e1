//! Config flow for Redfish Power
//!
//! Validates host and credentials against the BMC before an entry is
//! created. Failures are shown on the form under the `base` key.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, ConfigFlowHandler, FlowError, FlowResult, FormField};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use super::error::SetupError;
use super::hub::{ConnectionConfig, Password, RedfishPowerHub, DEFAULT_REQUEST_TIMEOUT};
use super::schema::PowerSchema;
use super::DOMAIN;

pub const CONF_HOST: &str = "host";
pub const CONF_USERNAME: &str = "username";
pub const CONF_PASSWORD: &str = "password";
pub const CONF_POWER_SCHEMA: &str = "power_schema";

/// Host, credentials and an optional pinned power layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    pub host: String,
    pub username: String,
    pub password: Password,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_schema: Option<PowerSchema>,
}

impl UserInput {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Password>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            power_schema: None,
        }
    }

    /// Check submitted form values. Nothing is sent to the device.
    pub fn from_value(value: &Value) -> Result<Self, FlowError> {
        let host = required_str(value, CONF_HOST)?;
        let username = required_str(value, CONF_USERNAME)?;
        let password = required_str(value, CONF_PASSWORD)?;

        let power_schema = match value.get(CONF_POWER_SCHEMA) {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value(raw.clone()).map_err(|e| {
                FlowError::InvalidInput {
                    field: CONF_POWER_SCHEMA.to_string(),
                    reason: e.to_string(),
                }
            })?),
        };

        Ok(Self {
            host: host.trim().to_string(),
            username: username.trim().to_string(),
            password: Password::new(password),
            power_schema,
        })
    }

    /// Read back the input stored in an entry's data
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, FlowError> {
        let data: serde_json::Map<String, Value> = entry
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::from_value(&Value::Object(data))
    }

    /// Entry data for this input
    pub fn to_data(&self) -> HashMap<String, Value> {
        let mut data = HashMap::new();
        data.insert(CONF_HOST.to_string(), Value::from(self.host.as_str()));
        data.insert(CONF_USERNAME.to_string(), Value::from(self.username.as_str()));
        data.insert(
            CONF_PASSWORD.to_string(),
            Value::from(self.password.expose()),
        );
        if let Some(schema) = self.power_schema {
            if let Ok(value) = serde_json::to_value(schema) {
                data.insert(CONF_POWER_SCHEMA.to_string(), value);
            }
        }
        data
    }

    pub fn connection_config(&self, request_timeout: Duration) -> ConnectionConfig {
        ConnectionConfig::new(
            self.host.as_str(),
            self.username.as_str(),
            self.password.clone(),
        )
        .with_timeout(request_timeout)
    }
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, FlowError> {
    match value.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(FlowError::InvalidInput {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        }),
        None => Err(FlowError::InvalidInput {
            field: field.to_string(),
            reason: "required string".to_string(),
        }),
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    /// Entry title: the device's host name
    pub title: String,
}

/// Check that the BMC is reachable and accepts the credentials.
///
/// Runs the liveness check, then the credential check, then reads the host
/// name used as entry title. Any failure during the liveness check is
/// [`SetupError::CannotConnect`]; a rejected credential check is
/// [`SetupError::InvalidAuth`]; everything else is [`SetupError::Unknown`].
pub async fn validate_input(
    input: &UserInput,
    request_timeout: Duration,
) -> Result<ValidatedInput, SetupError> {
    let hub = RedfishPowerHub::new(input.connection_config(request_timeout))
        .map_err(|e| SetupError::Unknown(e.to_string()))?;

    match hub.test_connection().await {
        Ok(true) => {}
        Ok(false) => return Err(SetupError::CannotConnect),
        Err(e) => {
            debug!("Liveness check of {} failed: {}", input.host, e);
            return Err(SetupError::CannotConnect);
        }
    }

    match hub.authenticate().await {
        Ok(true) => {}
        Ok(false) => return Err(SetupError::InvalidAuth),
        Err(e) => return Err(SetupError::Unknown(e.to_string())),
    }

    let title = hub
        .get_device_hostname()
        .await
        .map_err(|e| SetupError::Unknown(e.to_string()))?;

    Ok(ValidatedInput { title })
}

/// Config flow handler for the `redfish_power` domain
#[derive(Debug, Clone)]
pub struct RedfishPowerConfigFlow {
    request_timeout: Duration,
}

impl RedfishPowerConfigFlow {
    /// Entry data version
    pub const VERSION: u32 = 1;

    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    fn user_form(errors: HashMap<String, String>) -> FlowResult {
        FlowResult::form(
            DOMAIN,
            "user",
            vec![
                FormField::required_string(CONF_HOST),
                FormField::required_string(CONF_USERNAME),
                FormField::required_password(CONF_PASSWORD),
            ],
            errors,
        )
    }

    async fn validate(&self, input: &UserInput) -> Result<ValidatedInput, SetupError> {
        let result = validate_input(input, self.request_timeout).await;
        if let Err(SetupError::Unknown(ref msg)) = result {
            error!("Unexpected exception validating {}: {}", input.host, msg);
        }
        result
    }

    fn create_entry(input: &UserInput, info: ValidatedInput) -> FlowResult {
        info!("Creating entry '{}' for {}", info.title, input.host);
        FlowResult::create_entry(DOMAIN, info.title, input.to_data(), Self::VERSION)
            .with_unique_id(input.host.as_str())
    }
}

impl Default for RedfishPowerConfigFlow {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl ConfigFlowHandler for RedfishPowerConfigFlow {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn async_step_user(&self, user_input: Option<Value>) -> Result<FlowResult, FlowError> {
        let Some(raw) = user_input else {
            return Ok(Self::user_form(HashMap::new()));
        };

        let input = UserInput::from_value(&raw)?;
        match self.validate(&input).await {
            Ok(info) => Ok(Self::create_entry(&input, info)),
            Err(e) => {
                let mut errors = HashMap::new();
                errors.insert("base".to_string(), e.key().to_string());
                Ok(Self::user_form(errors))
            }
        }
    }

    async fn async_step_import(&self, import_data: Value) -> Result<FlowResult, FlowError> {
        let input = UserInput::from_value(&import_data)?;
        match self.validate(&input).await {
            Ok(info) => Ok(Self::create_entry(&input, info)),
            Err(e) => Ok(FlowResult::abort(DOMAIN, e.key())),
        }
    }
}
