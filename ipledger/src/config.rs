//! Configuration management using Figment
//!
//! Configuration is loaded from `./config.toml` with `IPLEDGER_`-prefixed
//! environment variables layered on top (double underscore separates nesting,
//! e.g. `IPLEDGER_QUEUE__MAX_ATTEMPTS=3`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Durable event queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Audit log store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gateway upstream configuration (gateway binary only)
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Whether error responses may carry internal detail
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

/// Queue driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDriver {
    /// In-process queue; single-binary deployments and tests
    Memory,
    /// Redis Streams with a consumer group
    Redis,
}

/// Durable event queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue backend
    #[serde(default = "default_queue_driver")]
    pub driver: QueueDriver,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Stream key holding pending audit events
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Consumer group shared by the persister workers
    #[serde(default = "default_group")]
    pub group: String,

    /// Maximum pooled Redis connections
    #[serde(default = "default_queue_max_connections")]
    pub max_connections: usize,

    /// Seconds before an unacked delivery becomes visible again
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    /// Delivery attempts before a message is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Milliseconds a dequeue call blocks waiting for a message
    #[serde(default = "default_block_millis")]
    pub block_millis: u64,

    /// Number of persister workers to run
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl QueueConfig {
    /// Visibility timeout as a Duration
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    /// Dequeue block window as a Duration
    pub fn block_window(&self) -> Duration {
        Duration::from_millis(self.block_millis)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            driver: default_queue_driver(),
            url: default_redis_url(),
            stream: default_stream(),
            group: default_group(),
            max_connections: default_queue_max_connections(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_attempts: default_max_attempts(),
            block_millis: default_block_millis(),
            workers: default_workers(),
        }
    }
}

/// Storage driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// PostgreSQL via sqlx
    Postgres,
    /// Embedded libsql database file
    Local,
}

/// Audit log store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default = "default_storage_driver")]
    pub driver: StorageDriver,

    /// PostgreSQL connection URL
    #[serde(default = "default_postgres_url")]
    pub url: String,

    /// Database file path for the local backend
    #[serde(default = "default_local_path")]
    pub path: String,

    /// Maximum connections in the PostgreSQL pool
    #[serde(default = "default_storage_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: default_storage_driver(),
            url: default_postgres_url(),
            path: default_local_path(),
            max_connections: default_storage_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

/// Gateway upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the authentication service
    pub auth_url: String,

    /// Base URL of the IP inventory service
    pub inventory_url: String,

    /// Base URL of the audit query service
    pub audit_url: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl GatewayConfig {
    /// Upstream timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_false() -> bool {
    false
}

fn default_body_limit_mb() -> usize {
    2
}

fn default_queue_driver() -> QueueDriver {
    QueueDriver::Memory
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_stream() -> String {
    "audit:events".to_string()
}

fn default_group() -> String {
    "audit-persisters".to_string()
}

fn default_queue_max_connections() -> usize {
    16
}

fn default_visibility_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_block_millis() -> u64 {
    5000
}

fn default_workers() -> usize {
    2
}

fn default_storage_driver() -> StorageDriver {
    StorageDriver::Local
}

fn default_postgres_url() -> String {
    "postgres://localhost:5432/audit".to_string()
}

fn default_local_path() -> String {
    "audit.db".to_string()
}

fn default_storage_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from `./config.toml` plus environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("IPLEDGER_").split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `name` as the default service name.
    ///
    /// Binaries pass their package name so each service identifies itself
    /// without a config file; `config.toml` and environment overrides still
    /// win.
    pub fn load_named(name: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Serialized::default("service.name", name))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("IPLEDGER_").split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Gateway upstream configuration, required by the gateway binary
    pub fn require_gateway(&self) -> Result<&GatewayConfig> {
        self.gateway.as_ref().ok_or_else(|| {
            crate::error::Error::Config(Box::new(figment::Error::from(
                "missing `gateway` section: set gateway.auth_url, gateway.inventory_url, \
                 and gateway.audit_url"
                    .to_string(),
            )))
        })
    }

    fn validate(&self) -> std::result::Result<(), Box<figment::Error>> {
        if self.service.name.is_empty() {
            return Err(Box::new(figment::Error::from(
                "service.name cannot be empty".to_string(),
            )));
        }

        if self.service.port == 0 {
            return Err(Box::new(figment::Error::from(
                "service.port must be greater than 0".to_string(),
            )));
        }

        if self.queue.max_attempts == 0 {
            return Err(Box::new(figment::Error::from(
                "queue.max_attempts must be at least 1".to_string(),
            )));
        }

        if self.queue.workers == 0 {
            return Err(Box::new(figment::Error::from(
                "queue.workers must be at least 1".to_string(),
            )));
        }

        if self.queue.driver == QueueDriver::Redis && self.queue.url.is_empty() {
            return Err(Box::new(figment::Error::from(
                "queue.url is required for the redis driver".to_string(),
            )));
        }

        match self.storage.driver {
            StorageDriver::Postgres if self.storage.url.is_empty() => {
                return Err(Box::new(figment::Error::from(
                    "storage.url is required for the postgres driver".to_string(),
                )));
            }
            StorageDriver::Local if self.storage.path.is_empty() => {
                return Err(Box::new(figment::Error::from(
                    "storage.path is required for the local driver".to_string(),
                )));
            }
            _ => {}
        }

        if let Some(ref gateway) = self.gateway {
            for (field, value) in [
                ("gateway.auth_url", &gateway.auth_url),
                ("gateway.inventory_url", &gateway.inventory_url),
                ("gateway.audit_url", &gateway.audit_url),
            ] {
                if value.is_empty() {
                    return Err(Box::new(figment::Error::from(format!(
                        "{} cannot be empty",
                        field
                    ))));
                }
            }
        }

        Ok(())
    }
}

impl From<Box<figment::Error>> for crate::error::Error {
    fn from(err: Box<figment::Error>) -> Self {
        crate::error::Error::Config(err)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "ipledger".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
                debug: false,
                body_limit_mb: default_body_limit_mb(),
            },
            queue: QueueConfig::default(),
            storage: StorageConfig::default(),
            gateway: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.queue.driver, QueueDriver::Memory);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.visibility_timeout_secs, 30);
        assert_eq!(config.storage.driver, StorageDriver::Local);
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_gateway_url_rejected() {
        let mut config = Config::default();
        config.gateway = Some(GatewayConfig {
            auth_url: String::new(),
            inventory_url: "http://localhost:8001".to_string(),
            audit_url: "http://localhost:8002".to_string(),
            timeout_secs: 30,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.queue.visibility_timeout(), Duration::from_secs(30));
        assert_eq!(config.queue.block_window(), Duration::from_millis(5000));
    }

    #[test]
    fn test_load_named_seeds_service_name() {
        let config = Config::load_named("audit-service").unwrap();
        assert_eq!(config.service.name, "audit-service");
    }

    #[test]
    fn test_require_gateway() {
        let mut config = Config::default();
        assert!(config.require_gateway().is_err());

        config.gateway = Some(GatewayConfig {
            auth_url: "http://localhost:8001".to_string(),
            inventory_url: "http://localhost:8002".to_string(),
            audit_url: "http://localhost:8003".to_string(),
            timeout_secs: 30,
        });
        assert!(config.require_gateway().is_ok());
    }
}
