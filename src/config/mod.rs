//! Configuration management
//!
//! A single TOML document at ~/.config/modrover/config.toml holding the
//! download directory and the default loader/game-version selections.

mod paths;

pub use paths::Paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::error::AppError;

/// Persisted configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where downloaded mod files are written
    pub download_dir: Option<String>,

    /// Default mod loader (e.g. "fabric") used when no flag is given
    pub loader: Option<String>,

    /// Default game version (e.g. "1.20.1") used when no flag is given
    pub game_version: Option<String>,

    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: None,
            loader: None,
            game_version: None,
            paths: Paths::new(),
        }
    }
}

impl Config {
    /// Resolve the configured download directory, or fail with
    /// `NotConfigured` so the caller can surface it before starting a
    /// download.
    pub fn download_dir(&self) -> Result<PathBuf, AppError> {
        self.download_dir
            .as_deref()
            .map(PathBuf::from)
            .ok_or(AppError::NotConfigured)
    }

    /// Load configuration from disk or create the default
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_download_dir_is_not_configured() {
        let config = Config::default();
        assert!(matches!(
            config.download_dir(),
            Err(AppError::NotConfigured)
        ));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.download_dir = Some("/home/user/mods".to_string());
        config.loader = Some("fabric".to_string());
        config.game_version = Some("1.20.1".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.download_dir.as_deref(), Some("/home/user/mods"));
        assert_eq!(parsed.loader.as_deref(), Some("fabric"));
        assert_eq!(parsed.game_version.as_deref(), Some("1.20.1"));
    }
}
