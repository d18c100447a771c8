//! File-backed client configuration.
//!
//! A [`ClientConfig`] is a TOML-serializable profile for one service
//! client. Apply it with [`crate::ServiceClient::from_config`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub auth: AuthConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// URL scheme: "http" or "https"
    pub scheme: String,

    /// Service domain, e.g. "dialogs.yandex.net"
    pub domain: String,

    /// Service port; kept alongside the domain but not applied to URLs
    pub port: String,

    /// HTTP protocol version: "1.0" or "1.1"
    pub protocol_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth access token presented on every request
    pub access_token: String,

    /// Token expiry; informational, never validated by the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Proxy URL applied to the transport when set and non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// Enable verbose connection tracing
    pub debug: bool,

    /// User-Agent override; the library identity is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            auth: AuthConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            domain: String::new(),
            port: String::new(),
            protocol_version: "1.1".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            expires_in: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            debug: false,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Load config from the default location, creating it on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save config to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Default config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("yandex-client").join("config.toml"))
    }
}
