//! configuration.yaml loading
//!
//! Custom tags are resolved while walking the parsed document, so callers
//! only ever see plain YAML:
//!
//! - `!secret name` - value from secrets.yaml
//! - `!env_var NAME [default]` - environment variable
//! - `!include file.yaml` - another file, relative to the including one

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigTag {
    Secret,
    EnvVar,
    Include,
}

impl ConfigTag {
    fn from_tagged(tagged: &TaggedValue) -> Option<Self> {
        match tagged.tag.to_string().trim_start_matches('!') {
            "secret" => Some(Self::Secret),
            "env_var" => Some(Self::EnvVar),
            "include" => Some(Self::Include),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Secret => "!secret",
            Self::EnvVar => "!env_var",
            Self::Include => "!include",
        }
    }

    /// The tag's argument, which must be a non-empty string
    fn argument(self, value: Value) -> ConfigResult<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            other => Err(ConfigError::BadTag {
                tag: self.name().to_string(),
                reason: format!("expected a name, got {:?}", other),
            }),
        }
    }
}

/// Loads YAML files below one config directory
#[derive(Debug)]
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files being loaded, innermost last
    loading: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self {
            config_dir,
            secrets,
            loading: Vec::new(),
        })
    }

    /// Load `file` (relative paths resolve against the config directory)
    pub fn load_file(&mut self, file: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(file);
        self.load_path(path)
    }

    fn load_path(&mut self, path: PathBuf) -> ConfigResult<Value> {
        if self.loading.contains(&path) {
            return Err(ConfigError::IncludeCycle { path });
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let document: Value =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;

        debug!("Loading {:?}", path);
        self.loading.push(path);
        let resolved = self.resolve(document);
        self.loading.pop();
        resolved
    }

    fn resolve(&mut self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged),
            Value::Mapping(mapping) => {
                let mut resolved = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    resolved.insert(key, self.resolve(value)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue) -> ConfigResult<Value> {
        let Some(tag) = ConfigTag::from_tagged(&tagged) else {
            return Err(ConfigError::BadTag {
                tag: tagged.tag.to_string(),
                reason: "unsupported tag".to_string(),
            });
        };
        let argument = tag.argument(tagged.value)?;

        match tag {
            ConfigTag::Secret => self
                .secrets
                .get(&argument)
                .map(|secret| Value::String(secret.to_string())),
            ConfigTag::EnvVar => env_var(&argument),
            ConfigTag::Include => {
                let path = self.include_path(&argument);
                if !path.is_file() {
                    return Err(ConfigError::IncludeMissing { path });
                }
                self.load_path(path)
            }
        }
    }

    /// Includes resolve relative to the file that contains them
    fn include_path(&self, target: &str) -> PathBuf {
        let base = self
            .loading
            .last()
            .and_then(|current| current.parent())
            .unwrap_or(&self.config_dir);
        base.join(target)
    }
}

/// `NAME` or `NAME default text`
fn env_var(argument: &str) -> ConfigResult<Value> {
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(Value::String(value)),
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::MissingEnvVar {
            name: name.to_string(),
        }),
    }
}

/// Load `file` from `config_dir` with all tags resolved
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}
