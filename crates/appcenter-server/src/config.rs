use appcenter_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

use crate::membership::LockScope;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Redis configuration for the admin cache and the change lock
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Admin membership synchronizer tuning
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Sibling service endpoints
    #[serde(default)]
    pub clients: ClientsConfig,
    /// Catalog behaviour
    #[serde(default)]
    pub app: AppSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            match self.storage.postgres {
                None => {
                    return Err("storage.backend=postgres requires storage.postgres".into());
                }
                Some(ref pg) => {
                    if pg.url.is_empty() {
                        return Err("storage.postgres.url must not be empty".into());
                    }
                    if pg.pool_size == 0 {
                        return Err("storage.postgres.pool_size must be > 0".into());
                    }
                }
            }
        }
        // Redis validation
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err("redis.enabled=true requires redis.url".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
        }
        // Membership validation
        if self.membership.lock_ttl_ms == 0 {
            return Err("membership.lock_ttl_ms must be > 0".into());
        }
        if self.membership.poll_interval_ms == 0 {
            return Err("membership.poll_interval_ms must be > 0".into());
        }
        if self.membership.poll_interval_ms >= self.membership.lock_ttl_ms {
            return Err("membership.poll_interval_ms must be < membership.lock_ttl_ms".into());
        }
        // Client validation
        for (name, endpoint) in [
            ("org", &self.clients.org),
            ("flow", &self.clients.flow),
            ("chaos", &self.clients.chaos),
            ("form", &self.clients.form),
        ] {
            if url::Url::parse(&endpoint.base_url).is_err() {
                return Err(format!("clients.{name}.base_url must be an absolute URL"));
            }
            if endpoint.timeout_ms == 0 {
                return Err(format!("clients.{name}.timeout_ms must be > 0"));
            }
        }
        // Catalog validation
        if self.app.id_length == 0 {
            return Err("app.id_length must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local tables; data is lost on restart
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Redis configuration.
///
/// With Redis disabled the admin cache and the change lock are process-local,
/// which is only correct for single-instance deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Wait, create and recycle timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Lease lifetime of the admin change lock
    pub lock_ttl_ms: u64,
    /// Fixed delay between acquisition attempts
    pub poll_interval_ms: u64,
    pub lock_scope: LockScope,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 2000,
            poll_interval_ms: 200,
            lock_scope: LockScope::Global,
        }
    }
}

impl MembershipConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub base_url: String,
    #[serde(default = "default_client_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_client_timeout_ms() -> u64 {
    10_000
}

impl ServiceEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_client_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    /// Organization directory
    pub org: ServiceEndpoint,
    /// Workflow engine
    pub flow: ServiceEndpoint,
    /// Provisioning service
    pub chaos: ServiceEndpoint,
    /// Form engine, used by the in-process form role provisioning step
    pub form: ServiceEndpoint,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            org: ServiceEndpoint::new("http://org"),
            flow: ServiceEndpoint::new("http://flow"),
            chaos: ServiceEndpoint::new("http://chaos"),
            form: ServiceEndpoint::new("http://form"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Bitmask of sibling services provisioned for a new app
    pub init_server_bits: i32,
    /// Export/import format version accepted by this deployment
    pub compatible_version: String,
    pub id_length: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            init_server_bits: 0,
            compatible_version: "v1.0.0".into(),
            id_length: appcenter_core::DEFAULT_ID_LENGTH,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("appcenter.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., APPCENTER__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("APPCENTER")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.membership.lock_ttl(), Duration::from_secs(2));
        assert_eq!(cfg.membership.poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.membership.lock_scope, LockScope::Global);
    }

    #[test]
    fn postgres_backend_requires_section() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(cfg.validate().is_err());

        cfg.storage.postgres = Some(PostgresConfig::new("postgres://localhost/appcenter"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn poll_interval_must_be_shorter_than_ttl() {
        let mut cfg = AppConfig::default();
        cfg.membership.poll_interval_ms = cfg.membership.lock_ttl_ms;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn client_urls_must_parse() {
        let mut cfg = AppConfig::default();
        cfg.clients.flow.base_url = "not a url".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("clients.flow"));
    }
}
