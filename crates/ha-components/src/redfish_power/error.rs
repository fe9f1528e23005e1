//! Error types for the Redfish Power integration

use std::time::Duration;

use thiserror::Error;

/// Result type for Redfish requests
pub type RedfishResult<T> = Result<T, RedfishError>;

/// Failure of a single Redfish request or of reading its body
#[derive(Debug, Error)]
pub enum RedfishError {
    /// The HTTP client could not be created
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connect, TLS or transfer failure
    #[error("request to {path} failed: {source}")]
    Http {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {path} timed out")]
    Timeout { path: &'static str },

    /// Body is not the JSON document we expected
    #[error("invalid JSON from {path}: {source}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has no {field}")]
    MissingField {
        path: &'static str,
        field: &'static str,
    },

    /// Neither known power field layout is present
    #[error("{path} exposes no supported power reading")]
    UnsupportedPowerSchema { path: &'static str },

    #[error("invalid @odata.type pattern: {0}")]
    TypePattern(#[from] regex::Error),
}

impl RedfishError {
    /// True when the device could not be reached at all
    pub fn is_transport(&self) -> bool {
        matches!(self, RedfishError::Http { .. } | RedfishError::Timeout { .. })
    }
}

/// Setup failures, reported to the user as form errors
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot connect to the Redfish service")]
    CannotConnect,

    #[error("invalid authentication")]
    InvalidAuth,

    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl SetupError {
    /// Form error key for this failure
    pub fn key(&self) -> &'static str {
        match self {
            SetupError::CannotConnect => "cannot_connect",
            SetupError::InvalidAuth => "invalid_auth",
            SetupError::Unknown(_) => "unknown",
        }
    }

    /// Classify a request failure outside the liveness check
    pub fn from_request(err: RedfishError) -> Self {
        if err.is_transport() {
            SetupError::CannotConnect
        } else {
            SetupError::Unknown(err.to_string())
        }
    }
}

/// Failure of a periodic sensor update
#[derive(Debug, Error)]
pub enum PollError {
    #[error("power poll failed: {0}")]
    Request(#[from] RedfishError),

    #[error("power poll did not finish within {0:?}")]
    TimedOut(Duration),
}
