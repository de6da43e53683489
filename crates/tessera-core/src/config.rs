//! World configuration with TOML persistence
//!
//! The default location is `~/.config/tessera/world.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How a dirty filter rebuilds its cached entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Walk only the entities registered in the smallest included component table.
    #[default]
    Smallest,
    /// Walk every live entity and test its mask.
    Full,
}

/// Capacities and tuning knobs for a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity slots carved up front. The pool doubles when exhausted.
    pub entity_capacity: usize,
    /// Initial slot capacity of every component table.
    pub component_capacity: usize,
    /// Expected number of distinct filters.
    pub filter_capacity: usize,
    /// Initial capacity of the deferred operation queue.
    pub deferred_capacity: usize,
    /// Filter rebuild strategy.
    pub scan_strategy: ScanStrategy,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 128,
            component_capacity: 8,
            filter_capacity: 256,
            deferred_capacity: 128,
            scan_strategy: ScanStrategy::Smallest,
        }
    }
}

/// Errors raised while reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl WorldConfig {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tessera"))
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("world.toml"))
    }

    /// Parse a configuration from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> String {
        // Every field is a plain scalar or unit enum, serialization cannot fail.
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded world config from {:?}", path);
        Ok(config)
    }

    /// Load from the default location, or return defaults if absent or invalid.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };

        if !path.exists() {
            info!("No world config found, using defaults");
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }
}
