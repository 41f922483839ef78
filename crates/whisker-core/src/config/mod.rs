//! Configuration management for Whisker.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is fine.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Whisker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote source settings
    pub source: SourceConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.whisker.whisker/config.toml
    /// - Linux: ~/.config/whisker/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\whisker\whisker\config\config.toml
    ///
    /// Falls back to ~/.whisker/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "whisker", "whisker")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".whisker").join("config.toml")
            })
    }

    /// Resolved metadata endpoint. Missing is fatal before discovery.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        resolve_env_var(&self.source.base_url).ok_or(ConfigError::MissingValue("source.base_url"))
    }

    /// Resolved API key, if any.
    pub fn api_key(&self) -> Option<String> {
        resolve_env_var(&self.source.api_key)
    }

    /// Output directory with `~` expanded.
    pub fn output_dir(&self) -> PathBuf {
        let path_str = self.output.dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Log file path with `~` expanded.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file.as_ref().map(|file| {
            let path_str = file.to_string_lossy();
            PathBuf::from(shellexpand::tilde(&path_str).into_owned())
        })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
