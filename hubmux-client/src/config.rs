//! Client configuration
//!
//! Loaded from `$XDG_CONFIG_HOME/hubmux/config.toml`. Every field has a
//! default, so an absent file or section is fine. Command-line flags are
//! applied on top of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use hubmux_utils::{config_file, HubmuxError, Result};

use crate::connection::{ConnectionConfig, Endpoint, ReconnectPolicy};
use crate::control::DEFAULT_HUB_URL;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hub: HubConfig,
    pub reconnect: ReconnectConfig,
    pub resize: ResizeConfig,
}

/// Where the Hub lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Control API base URL
    pub url: String,
    /// Session channel URL; derived from `url` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Bound on a single connect attempt
    pub connect_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_HUB_URL.into(),
            ws_url: None,
            connect_timeout_ms: 5000,
        }
    }
}

/// Reconnect backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 30_000,
        }
    }
}

/// Resize re-render handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    /// How long to wait for a re-render before showing the last replay
    pub rerender_fallback_ms: u64,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            rerender_fallback_ms: 1500,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist and parse. The default file may be
    /// missing, and if it cannot be read or parsed a warning is logged and
    /// defaults are used. The result is validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config, path) = match path {
            Some(path) => (Self::read_file(path)?, path.to_path_buf()),
            None => {
                let path = config_file();
                (Self::load_default(&path), path)
            }
        };

        config.validate(&path)?;
        Ok(config)
    }

    fn load_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Self::default();
        }
        Self::read_file(path).unwrap_or_else(|e| {
            tracing::warn!("{}, using defaults", e);
            Self::default()
        })
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HubmuxError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<Config>(&content).map_err(|e| HubmuxError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Point at a different Hub. The session channel URL is re-derived.
    pub fn with_hub(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.hub.url = url;
            self.hub.ws_url = None;
        }
        self
    }

    /// Check value ranges and URLs
    pub fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: String| HubmuxError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        };

        if self.reconnect.base_ms == 0 {
            return Err(invalid("reconnect.base_ms must be positive".into()));
        }
        if self.reconnect.base_ms > self.reconnect.max_ms {
            return Err(invalid(format!(
                "reconnect.base_ms ({}) exceeds reconnect.max_ms ({})",
                self.reconnect.base_ms, self.reconnect.max_ms
            )));
        }
        if self.hub.connect_timeout_ms == 0 {
            return Err(invalid("hub.connect_timeout_ms must be positive".into()));
        }
        if self.resize.rerender_fallback_ms == 0 {
            return Err(invalid("resize.rerender_fallback_ms must be positive".into()));
        }

        let url = Url::parse(&self.hub.url)
            .map_err(|e| invalid(format!("hub.url '{}': {}", self.hub.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("hub.url '{}' must be http or https", self.hub.url)));
        }

        let ws_url = self.ws_url().map_err(|e| invalid(e.to_string()))?;
        Endpoint::parse(&ws_url).map_err(|e| invalid(format!("hub.ws_url: {}", e)))?;
        Ok(())
    }

    /// Session channel URL: explicit, or `ws(s)://<hub host>/ws`
    pub fn ws_url(&self) -> Result<String> {
        if let Some(ws_url) = &self.hub.ws_url {
            return Ok(ws_url.clone());
        }

        let mut url = Url::parse(&self.hub.url)
            .map_err(|e| HubmuxError::config(format!("Invalid Hub URL '{}': {}", self.hub.url, e)))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| HubmuxError::config(format!("Cannot derive ws URL from '{}'", self.hub.url)))?;
        url.set_path("/ws");
        url.set_query(None);
        Ok(url.to_string())
    }

    /// Settings for [`crate::HubConnection`]
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig {
            url: self.ws_url()?,
            connect_timeout: Duration::from_millis(self.hub.connect_timeout_ms),
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(self.reconnect.base_ms),
                Duration::from_millis(self.reconnect.max_ms),
            ),
            rerender_fallback: Duration::from_millis(self.resize.rerender_fallback_ms),
        })
    }
}

/// Default config file location
pub fn default_path() -> PathBuf {
    config_file()
}
