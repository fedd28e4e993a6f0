//! Typed host configuration, stored as TOML in the user's config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CalError, CalResult};

/// Days of context around the anchor date when expanding a visible window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub past_days: i64,
    pub future_days: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            past_days: 1,
            future_days: 5,
        }
    }
}

/// Configuration at `<config dir>/calgrid/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// strftime-style format used when printing occurrence times.
    pub time_format: String,
    pub window: WindowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            time_format: "%H:%M".to_string(),
            window: WindowConfig::default(),
        }
    }
}

impl Config {
    pub fn config_path() -> CalResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalError::Config("Could not determine config directory".into()))?;
        Ok(config_dir.join("calgrid").join("config.toml"))
    }

    /// Load from `path`, or the defaults when the file does not exist.
    pub fn load(path: &Path) -> CalResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CalError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> CalResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| CalError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
