use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure loading configuration.yaml or one of its sections
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("secret '{key}' is not defined in secrets.yaml")]
    UnknownSecret { key: String },

    /// `!env_var` without a default for an unset variable
    #[error("environment variable '{name}' is not set")]
    MissingEnvVar { name: String },

    #[error("included file {path} does not exist")]
    IncludeMissing { path: PathBuf },

    #[error("{path} includes itself")]
    IncludeCycle { path: PathBuf },

    /// A custom tag with an unusable argument, or an unsupported tag
    #[error("bad {tag} tag: {reason}")]
    BadTag { tag: String, reason: String },

    /// A top-level section did not match its expected shape
    #[error("invalid '{section}' section: {reason}")]
    Section { section: String, reason: String },
}
