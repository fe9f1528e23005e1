//! Config flows
//!
//! A flow turns form input or a YAML import into a validated config entry.
//! Every step answers with a [`FlowResult`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::entry::{ConfigEntry, ConfigEntrySource};

/// What a step asks the caller to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

type EntryData = HashMap<String, Value>;

/// Answer of one flow step.
///
/// Which of the optional fields are set depends on `result_type`: forms
/// carry `step_id`, `data_schema` and `errors`; created entries carry
/// `title`, `data`, `version` and `unique_id`; aborts carry `reason`.
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub data_schema: Vec<FormField>,
    /// Keyed by field name, or "base" for the whole form
    pub errors: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<EntryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl FlowResult {
    fn empty(handler: &str, result_type: FlowResultType) -> Self {
        Self {
            flow_id: ulid::Ulid::new().to_string(),
            handler: handler.into(),
            result_type,
            step_id: None,
            data_schema: vec![],
            errors: None,
            title: None,
            reason: None,
            version: None,
            data: None,
            unique_id: None,
        }
    }

    /// Show a form for `step_id`, with errors from the previous attempt
    pub fn form(
        handler: &str,
        step_id: &str,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
    ) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            data_schema,
            errors: if errors.is_empty() { None } else { Some(errors) },
            ..Self::empty(handler, FlowResultType::Form)
        }
    }

    /// Finish the flow by creating an entry
    pub fn create_entry(
        handler: &str,
        title: impl Into<String>,
        data: EntryData,
        version: u32,
    ) -> Self {
        Self {
            title: Some(title.into()),
            data: Some(data),
            version: Some(version),
            ..Self::empty(handler, FlowResultType::CreateEntry)
        }
    }

    /// Finish the flow without creating an entry
    pub fn abort(handler: &str, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::empty(handler, FlowResultType::Abort)
        }
    }

    pub fn with_unique_id(self, unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: Some(unique_id.into()),
            ..self
        }
    }

    /// Base error key of a form result, if any
    pub fn base_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get("base"))
            .map(String::as_str)
    }

    /// Build the config entry described by a `create_entry` result
    pub fn into_config_entry(self, source: ConfigEntrySource) -> Option<ConfigEntry> {
        if self.result_type != FlowResultType::CreateEntry {
            return None;
        }

        let mut entry = ConfigEntry::new(self.handler, self.title.unwrap_or_default())
            .with_data(self.data.unwrap_or_default())
            .with_source(source)
            .with_version(self.version.unwrap_or(1));
        if let Some(unique_id) = self.unique_id {
            entry = entry.with_unique_id(unique_id);
        }
        Some(entry)
    }
}

/// One input of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    /// "string" or "password"
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

impl FormField {
    pub fn required_string(name: &str) -> Self {
        Self {
            name: name.into(),
            field_type: "string".into(),
            required: true,
        }
    }

    /// Masked when rendered
    pub fn required_password(name: &str) -> Self {
        Self {
            field_type: "password".into(),
            ..Self::required_string(name)
        }
    }
}

/// Errors that stop a flow step before it can answer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("unknown flow step: {0}")]
    UnknownStep(String),
}

/// Config flow of one integration domain
#[async_trait]
pub trait ConfigFlowHandler: Send + Sync {
    /// Integration domain handled by this flow
    fn domain(&self) -> &'static str;

    /// First step of a user-initiated flow.
    ///
    /// Called with `None` to obtain the empty form, then with the submitted
    /// form values.
    async fn async_step_user(
        &self,
        user_input: Option<Value>,
    ) -> Result<FlowResult, FlowError>;

    /// Import an entry from YAML configuration
    async fn async_step_import(
        &self,
        import_data: Value,
    ) -> Result<FlowResult, FlowError> {
        let _ = import_data;
        Err(FlowError::UnknownStep("import".to_string()))
    }
}
