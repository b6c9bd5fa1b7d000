//! Config file parsing.
//!
//! The extension picks the format: TOML is the documented default, YAML
//! and commented JSON are accepted so existing dashboard configs can be
//! pointed at directly.

use std::fs;
use std::path::Path;

use crate::Config;

/// Configuration failures, from reading the file through validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed toml config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unrecognized config extension '{0}' (expected toml, yaml or json)")]
    UnknownExtension(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parse the config file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "toml" => Ok(toml::from_str(&raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&raw)?),
        // Comments are legal in config json; strip them before parsing.
        "json" | "jsonc" => {
            let reader = json_comments::StripComments::new(raw.as_bytes());
            Ok(serde_json::from_reader(reader)?)
        }
        other => Err(ConfigError::UnknownExtension(other.to_string())),
    }
}
