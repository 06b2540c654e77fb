use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Proxy path of the metrics adapter service on the API server
pub const DEFAULT_PROXY_PATH: &str =
    "/api/v1/namespaces/kube-system/services/ack-metrics-adapter-api-service:8080/proxy";

pub const DEFAULT_WINDOW: &str = "1h";

pub const DEFAULT_FILTER: &str =
    r#"namespace:"kube-system"+controllerKind:"ReplicaSet"+label[app]:"ack-cost-exporter""#;

/// Errors that can occur during settings operations
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

/// Query settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Path on the API server that proxies to the cost service
    #[serde(default = "default_proxy_path")]
    pub proxy_path: String,

    /// Cost window, e.g. `1h`, `24h`, `7d`
    #[serde(default = "default_window")]
    pub window: String,

    /// Allocation filter expression
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Kubeconfig to use instead of `KUBECONFIG` / `~/.kube/config`
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_proxy_path() -> String {
    DEFAULT_PROXY_PATH.to_string()
}

fn default_window() -> String {
    DEFAULT_WINDOW.to_string()
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            proxy_path: default_proxy_path(),
            window: default_window(),
            filter: default_filter(),
            kubeconfig: None,
        }
    }
}

impl QuerySettings {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf, SettingsError> {
        Ok(dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("costquery"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf, SettingsError> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&Self::settings_path()?)
    }

    /// Load settings from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!("Settings file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }
}
