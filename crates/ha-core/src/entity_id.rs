//! `domain.object_id` identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("'{0}' is not of the form domain.object_id")]
    Malformed(String),

    #[error("invalid domain '{0}'")]
    Domain(String),

    #[error("invalid object_id '{0}'")]
    ObjectId(String),
}

/// An entity identifier such as `sensor.rack_power_consumption`.
///
/// Both halves are non-empty, made of `[a-z0-9_]` and neither starts nor
/// ends with `_`. The domain additionally may not contain `__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let (domain, object_id) = (domain.into(), object_id.into());
        if !is_slug(&domain) || domain.contains("__") {
            return Err(EntityIdError::Domain(domain));
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::ObjectId(object_id));
        }
        Ok(Self { domain, object_id })
    }

    /// Entity id for a display name, run through [`filter_object_id`].
    ///
    /// `fallback` is used when the filtered name has nothing but underscores.
    pub fn from_name(
        domain: impl Into<String>,
        name: &str,
        fallback: &str,
    ) -> Result<Self, EntityIdError> {
        let filtered = filter_object_id(name);
        match filtered.trim_matches('_') {
            "" => Self::new(domain, fallback),
            object_id => Self::new(domain, object_id),
        }
    }

    /// The same id with `_{n}` appended to the object_id, used to tell
    /// apart entities whose names filter to the same id
    pub fn numbered(&self, n: u32) -> Self {
        Self {
            domain: self.domain.clone(),
            object_id: format!("{}_{}", self.object_id, n),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Strip a name down to lowercase ASCII letters and `_`.
///
/// Nothing is substituted: digits, capitals, `-` and spaces simply vanish,
/// so `"Web-Server01"` gives `"eberver"` and different hosts may collide.
pub fn filter_object_id(name: &str) -> String {
    name.chars()
        .filter(|c| matches!(c, 'a'..='z' | '_'))
        .collect()
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::Malformed(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
