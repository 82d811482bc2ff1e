//! Application configuration, stored as one JSON file in the config directory.

pub mod connection_config;
pub mod log_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use connection_config::ConnectionSettings;
pub use log_config::{LogLevel, LogSettings};

use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "ring_bridge_config.json";
const DEFAULT_STORAGE_DIR: &str = "storage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionSettings,
    pub logging: LogSettings,
    /// Directory of the JSON table files. Relative paths resolve against the config directory.
    pub storage_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            connection: ConnectionSettings::default(),
            logging: LogSettings::default(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
        }
    }
}

impl AppConfig {
    /// Loads the config from `config_dir`, or the defaults when there is no file yet.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        if ensure_directory_exists(config_dir).await? {
            info!("Created config directory {:?}", config_dir);
        }
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;
        info!("Config saved to {:?}", file_path);
        Ok(())
    }

    pub fn storage_path(&self, config_dir: &Path) -> PathBuf {
        if self.storage_dir.is_absolute() {
            self.storage_dir.clone()
        } else {
            config_dir.join(&self.storage_dir)
        }
    }
}
