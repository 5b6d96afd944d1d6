//! Top-level on-disk application configuration.

use serde::{Deserialize, Serialize};

use super::proxy::ProxyConfig;

/// Full application configuration, as persisted to `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version, bumped on breaking on-disk layout changes.
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Proxy dispatcher configuration.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

fn default_config_version() -> u32 {
    1
}

impl AppConfig {
    /// Create default configuration.
    pub fn new() -> Self {
        Self { version: default_config_version(), proxy: ProxyConfig::default() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
