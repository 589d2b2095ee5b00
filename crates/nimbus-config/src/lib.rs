pub mod error;

pub use error::*;

use nimbus_cloud::{PollConfig, ProvisionSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file directly
pub const CONFIG_PATH_ENV: &str = "NIMBUS_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["nimbus.yaml", ".nimbus.yaml"];

fn default_scope() -> String {
    "default".to_string()
}

/// Settings read from `nimbus.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NimbusConfig {
    /// Waiting for created objects to become active
    #[serde(default)]
    pub poll: PollConfig,

    /// Waiting for deleted objects to disappear
    #[serde(default)]
    pub delete_poll: PollConfig,

    /// External gateway network, when the backend's default is not wanted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_network: Option<String>,

    /// In-memory scope used by the simulator
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for NimbusConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            delete_poll: PollConfig::default(),
            external_network: None,
            scope: default_scope(),
        }
    }
}

impl NimbusConfig {
    pub fn settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            poll: self.poll,
            delete_poll: self.delete_poll,
        }
    }

    /// Parse YAML text; `path` is only used in error messages
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        // An empty file is a valid, all-defaults config.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    fn validate(&self) -> Result<()> {
        for (key, poll) in [("poll", &self.poll), ("delete_poll", &self.delete_poll)] {
            if poll.interval_ms == 0 {
                return Err(ConfigError::Invalid {
                    key: format!("{}.interval_ms", key),
                    reason: "must be greater than 0".to_string(),
                });
            }
            if poll.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: format!("{}.max_attempts", key),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        if self.scope.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "scope".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// The loaded config and the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: NimbusConfig,
    pub source: Option<PathBuf>,
}

/// Nimbus' global config directory
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("nimbus"))
}

/// Find the config file
///
/// Search order:
/// 1. `NIMBUS_CONFIG_PATH` (direct path)
/// 2. current directory: `nimbus.yaml`, `.nimbus.yaml`
/// 3. `./.nimbus/config.yaml`
/// 4. `~/.config/nimbus/config.yaml` (global)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!("{} points at {}, which does not exist", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let local = current_dir.join(".nimbus").join("config.yaml");
    if local.exists() {
        return Ok(Some(local));
    }

    if let Ok(config_dir) = get_config_dir() {
        let global = config_dir.join("config.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Load the config, falling back to defaults when no file exists
pub fn load() -> Result<LoadedConfig> {
    match find_config_file()? {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            Ok(LoadedConfig {
                config: NimbusConfig::from_path(&path)?,
                source: Some(path),
            })
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(LoadedConfig {
                config: NimbusConfig::default(),
                source: None,
            })
        }
    }
}
