use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{CallOptions, PluginError, Result, handshake::HandshakeConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// handshake shared by host and plugin
    pub handshake: HandshakeConfig,
    /// host side settings
    pub client: ClientConfig,
    /// plugin side settings
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// connection timeout in milliseconds, defaults to 5000
    pub connect_timeout_ms: u64,
    /// per-call deadline in milliseconds, unbounded when absent
    pub call_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// address the plugin listens on, defaults to an ephemeral loopback port
    pub address: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            call_timeout_ms: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:0".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Call options used when the caller does not pass its own.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            timeout: self.call_timeout_ms.map(Duration::from_millis),
            cancel: None,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| PluginError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<Config>(toml_str).map_err(|e| PluginError::Config(format!("failed to parse the toml str: {}", e)))
    }
}
