//! Application configuration management.
//!
//! Configuration is stored at `~/.config/pkv-belege/config.json`. The
//! origin and data directory can be overridden through the environment
//! (`PKV_BELEGE_ORIGIN`, `PKV_BELEGE_DATA_DIR`).

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::models::APP_SLUG;

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_ORIGIN: &str = "PKV_BELEGE_ORIGIN";
pub const ENV_DATA_DIR: &str = "PKV_BELEGE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL the application shell is deployed under.
    pub origin_url: Option<String>,
    /// Version token to run the cache manager as. Defaults to this build's.
    pub app_version: Option<String>,
    #[serde(default)]
    pub skip_waiting_on_install: bool,
    /// Never contact the origin; serve only what is cached.
    #[serde(default)]
    pub offline_mode: bool,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_SLUG).join(CONFIG_FILE))
    }

    /// Apply `PKV_BELEGE_ORIGIN` and `PKV_BELEGE_DATA_DIR` if set.
    pub fn apply_env(self) -> Self {
        let origin = std::env::var(ENV_ORIGIN).ok().filter(|v| !v.is_empty());
        let data_dir = std::env::var_os(ENV_DATA_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        self.with_overrides(origin, data_dir)
    }

    pub fn with_overrides(mut self, origin: Option<String>, data_dir: Option<PathBuf>) -> Self {
        if origin.is_some() {
            self.origin_url = origin;
        }
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        self
    }

    pub fn origin(&self) -> Result<&str> {
        self.origin_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No origin configured. Set origin_url in {} or {}",
                CONFIG_FILE,
                ENV_ORIGIN
            )
        })
    }

    /// Where records, settings and bookkeeping keys are stored.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_SLUG))
    }

    /// Where cache generations are stored.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.join("cache"));
        }
        let cache_dir =
            dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_SLUG))
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::default();
        if let Some(ref version) = self.app_version {
            config.version = version.clone();
        }
        config.skip_waiting_on_install = self.skip_waiting_on_install;
        config
    }
}
