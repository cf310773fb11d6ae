//! Persisted CLI configuration.
//!
//! Remembers the default desk address so the CLI can run without
//! `--address` once a desk has been picked. This is glue around the
//! library; nothing desk-side is cached here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bluetooth address of the desk to use when none is given.
    pub desk_address: Option<String>,
}

impl Config {
    /// Configuration directory path (~/.idasen-control)
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".idasen-control"))
    }

    /// Configuration file path (~/.idasen-control/config)
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config"))
    }

    /// Load configuration from file, or fall back to the default.
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            let content =
                fs::read_to_string(&config_file).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            Ok(config)
        } else {
            log::debug!("Config file not found, using defaults");
            Ok(Config::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        let config_file = Self::config_file()?;
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_file, content).context("Failed to write config file")?;

        log::info!("Configuration saved to {:?}", config_file);
        Ok(())
    }
}
