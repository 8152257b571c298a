//! Configuration Management
//!
//! Handles persistent configuration storage for describer.

use crate::describer::CollectorConfig;
use crate::providers::managed::ManagedSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// API token (environment variables take precedence)
    #[serde(default)]
    pub token: Option<String>,
    /// Override the API base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default organization
    #[serde(default)]
    pub org: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManagedConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub settings: ManagedSettings,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub containers: ProviderConfig,
    #[serde(default)]
    pub scm: ProviderConfig,
    #[serde(default)]
    pub managed: ManagedConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("describer").join("config.json"))
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Reject base URLs that do not parse and collector limits of zero
    pub fn validate(&self) -> Result<()> {
        let base_urls = [
            ("containers", self.containers.base_url.as_deref()),
            ("scm", self.scm.base_url.as_deref()),
            ("managed", self.managed.base_url.as_deref()),
        ];
        for (provider, base_url) in base_urls {
            if let Some(base_url) = base_url {
                url::Url::parse(base_url)
                    .with_context(|| format!("Invalid {}.base_url: {}", provider, base_url))?;
            }
        }

        if self.collector.max_concurrency == 0 {
            bail!("collector.max_concurrency must be at least 1");
        }
        if self.collector.channel_capacity == 0 {
            bail!("collector.channel_capacity must be at least 1");
        }
        Ok(())
    }
}
