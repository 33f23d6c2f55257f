mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const APP_DIR: &str = "kinetic-sensors";

/// Returns the config directory, e.g. ~/.config/kinetic-sensors/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the default config file path: <config_dir>/kinetic-sensors/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Returns the default orientation log path: <data_dir>/kinetic-sensors/orientation.csv
pub fn default_log_path() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join(APP_DIR);
    Ok(dir.join("orientation.csv"))
}

impl AppConfig {
    /// Where the orientation log should go, or `None` if logging is off.
    pub fn log_path(&self) -> Result<Option<PathBuf>> {
        if !self.logging.enabled {
            return Ok(None);
        }
        match &self.logging.path {
            Some(path) => Ok(Some(path.clone())),
            None => default_log_path().map(Some),
        }
    }
}

/// Load config from the default location, or return defaults if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Load config from `path`, or return defaults if the file does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!(?path, "No config found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Save config to the default location.
pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let path = config_path()?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}
