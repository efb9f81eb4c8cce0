use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub bidding: BiddingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// External "pujas" service. Disabled when `base_url` is unset.
#[derive(Debug, Deserialize, Clone)]
pub struct BiddingConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

/// Notification webhook. Notifications are only logged when `webhook_url` is unset.
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

fn default_store_timeout_ms() -> u64 { 5_000 }

fn default_collaborator_timeout_ms() -> u64 { 3_000 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, uncommitted overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `TUTORIA_STORE__BACKEND=redis` sets `store.backend`
            .add_source(config::Environment::with_prefix("TUTORIA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
