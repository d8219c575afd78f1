//! TOML-based configuration for the MQL compiler.
//!
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! Example configuration:
//! ```toml
//! [limits]
//! default_limit = 1000
//! max_limit = 10000
//!
//! [rollup]
//! granularities = [10, 60, 3600, 86400]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Result paging limits.
    pub limits: LimitSettings,

    /// Rollup settings.
    pub rollup: RollupSettings,
}

/// Result paging limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Limit applied when the context does not set one.
    pub default_limit: u64,

    /// Largest limit a context may request.
    pub max_limit: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            default_limit: 1000,
            max_limit: 10000,
        }
    }
}

/// Rollup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RollupSettings {
    /// Storage granularities in seconds.
    pub granularities: Vec<u64>,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            granularities: vec![10, 60, 3600, 86400],
        }
    }
}

impl RollupSettings {
    pub fn smallest_granularity(&self) -> Option<u64> {
        self.granularities.iter().copied().min()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `MQL_CONFIG`
    /// 2. `./mql.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("MQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("mql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Check the loaded values are usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.limits.max_limit == 0 {
            return Err(SettingsError::InvalidConfig("limits.max_limit must be positive".into()));
        }
        if self.limits.default_limit == 0 || self.limits.default_limit > self.limits.max_limit {
            return Err(SettingsError::InvalidConfig(format!(
                "limits.default_limit must be between 1 and {}",
                self.limits.max_limit
            )));
        }
        if self.rollup.granularities.is_empty() {
            return Err(SettingsError::InvalidConfig("rollup.granularities must not be empty".into()));
        }
        if self.rollup.granularities.contains(&0) {
            return Err(SettingsError::InvalidConfig("rollup.granularities must be positive".into()));
        }
        Ok(())
    }
}
