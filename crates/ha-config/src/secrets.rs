//! secrets.yaml
//!
//! A flat mapping of names to scalar values, referenced from
//! configuration.yaml with `!secret name`. Values are never printed.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

pub const SECRETS_FILE: &str = "secrets.yaml";

#[derive(Clone, Default)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    /// Read `secrets.yaml` from `config_dir`. A missing file means no secrets.
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{:?} not present", path);
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let raw: HashMap<String, Value> = match serde_yaml::from_str(&content) {
            Ok(raw) => raw,
            Err(source) => return Err(ConfigError::Parse { path, source }),
        };

        raw.into_iter()
            .map(|(key, value)| match scalar_string(&value) {
                Some(s) => Ok((key, s)),
                None => Err(ConfigError::BadTag {
                    tag: "!secret".to_string(),
                    reason: format!("'{}' in {} is not a scalar", key, SECRETS_FILE),
                }),
            })
            .collect::<ConfigResult<HashMap<_, _>>>()
            .map(Self)
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownSecret {
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_tuple("Secrets").field(&names).finish()
    }
}
