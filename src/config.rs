//! Gateway configuration, loaded once at startup from a TOML file.
//!
//! All values are fixed for the lifetime of the process. A missing config
//! file is not an error; the built-in defaults describe a local broker and
//! backend setup.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::{read_to_string, try_exists};
use tracing::info;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub broker: BrokerConfig,
    pub http: HttpConfig,
    pub limits: LimitsConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub command_topic: String,
    pub telemetry_topic: String,
    pub keep_alive_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Port the command listener binds on.
    pub listen_port: u16,
    /// Path of the single command endpoint.
    pub command_path: String,
    /// Backend URL that receives telemetry.
    pub backend_url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accumulated body size in bytes; one byte is reserved, so at
    /// most `max_body_size - 1` bytes of payload are ever kept.
    pub max_body_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            command_topic: "robot/command".to_string(),
            telemetry_topic: "robot/telemetry".to_string(),
            keep_alive_secs: 60,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_port: 8000,
            command_path: "/command".to_string(),
            backend_url: "http://localhost:8080/api/telemetry".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_body_size: 1024 }
    }
}

impl GatewayConfig {
    /// Loads the config from `path`, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse aborts startup.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        let exists = try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path, e))?;

        if !exists {
            info!("No config file at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path, e))?;
        let config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path, e))?;

        info!("Loaded config from {}", path);
        Ok(config)
    }
}
