//! Engine Configuration
//!
//! Read from a YAML file; every field has a default, so an empty file (or
//! no file at all) is a valid configuration.
//!
//! ```yaml
//! templates_dir: templates
//! state_file: civicflow_state.json
//! max_workers: 20
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::execution::DEFAULT_MAX_WORKERS;

/// Default directory for template files.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory searched for `<id>.yaml`, `<id>.yml` and `<id>.json`
    pub templates_dir: PathBuf,

    /// JSON file holding instances, audit records and appeals; in-memory
    /// when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Batch pool bound for steps that do not set `max_workers`
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            state_file: None,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading config from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_yaml(&content).map_err(|reason| ConfigError::Parse {
            path: path.display().to_string(),
            reason,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "max_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.templates_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "templates_dir".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
