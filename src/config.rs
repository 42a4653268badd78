use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "speed-dial";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOCAL_DB_FILE_NAME: &str = "local.redb";

/// Library configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub quota: QuotaConfig,
    pub storage: StorageConfig,
}

/// Sync tier limits and the safety margins kept under them.
///
/// The hard limits must match what the browser's sync storage documents;
/// they are configuration so a different tier can be targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Total bytes the sync tier accepts across all keys
    pub total_bytes: usize,
    /// Bytes a single sync key (name plus JSON value) may occupy
    pub per_item_bytes: usize,
    /// Kept free under `per_item_bytes` when sizing chunks
    pub chunk_margin: usize,
    /// Kept free under `total_bytes` for settings and metadata
    pub total_margin: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            total_bytes: 102_400,
            per_item_bytes: 8_192,
            chunk_margin: 1_024,
            total_margin: 10_240,
        }
    }
}

impl QuotaConfig {
    /// Largest serialized chunk value the codec should produce.
    pub fn chunk_budget(&self) -> usize {
        self.per_item_bytes.saturating_sub(self.chunk_margin)
    }

    /// Largest total payload that is still sent to the sync tier.
    pub fn sync_budget(&self) -> usize {
        self.total_bytes.saturating_sub(self.total_margin)
    }
}

/// Device-local storage settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local tier database file (empty = default data dir)
    pub local_db_path: Option<String>,
}

impl StorageConfig {
    pub fn local_db_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.local_db_path {
            return Ok(PathBuf::from(path));
        }

        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&data_dir)
            .context("Failed to create data directory")?;

        Ok(data_dir.join(LOCAL_DB_FILE_NAME))
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        if config.quota.chunk_budget() == 0 {
            anyhow::bail!(crate::Error::Config(
                "quota.chunk_margin leaves no room under quota.per_item_bytes".to_string()
            ));
        }

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
