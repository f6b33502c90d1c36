use std::env;
use std::time::Duration;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// Environment variable prefix, e.g. `SHARDPOOL__POOL__SIZE=20`.
const ENV_PREFIX: &str = "SHARDPOOL";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub shards: ShardsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Connection target for one Postgres database.
///
/// Only the driver reads this; the pool never looks inside it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DbConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_postgres")]
    pub username: String,
    #[serde(default = "default_postgres")]
    pub password: String,
    #[serde(default = "default_postgres")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of connections opened at startup
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// Optional upper bound on how long `acquire()` waits, in milliseconds
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Number of concurrent workers per benchmark run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardsConfig {
    /// Usernames starting with 'a'..='m'
    #[serde(default = "default_first_shard")]
    pub first: DbConfig,
    /// Every other username
    #[serde(default = "default_second_shard")]
    pub second: DbConfig,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Fallback filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_concurrency() -> usize {
    150
}

fn default_first_shard() -> DbConfig {
    DbConfig {
        port: 5430,
        ..DbConfig::default()
    }
}

fn default_second_shard() -> DbConfig {
    DbConfig {
        port: 5431,
        ..DbConfig::default()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SHARDPOOL__POOL__SIZE, SHARDPOOL__SHARDS__FIRST__PORT, ...
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Build settings from an in-memory TOML document layered over the defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Self::defaults(Config::builder())?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("pool.size", 10)?
            .set_default("bench.concurrency", 150)?
            .set_default("shards.pool_size", 10)?
            .set_default("logging.level", "info")
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl DbConfig {
    /// libpq-style target description with the password hidden, for logs.
    pub fn masked(&self) -> String {
        format!(
            "host={} port={} user={} password=*** dbname={}",
            self.host, self.port, self.username, self.database
        )
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl ShardsConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            username: default_postgres(),
            password: default_postgres(),
            database: default_postgres(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            acquire_timeout_ms: None,
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            first: default_first_shard(),
            second: default_second_shard(),
            pool_size: default_pool_size(),
            acquire_timeout_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);

        let shards = ShardsConfig::default();
        assert_eq!(shards.first.port, 5430);
        assert_eq!(shards.second.port, 5431);
        assert_eq!(shards.pool_size, 10);
    }

    #[test]
    fn test_masked_hides_password() {
        let db = DbConfig {
            password: "secret123".to_string(),
            ..DbConfig::default()
        };
        let masked = db.masked();
        assert!(!masked.contains("secret123"));
        assert!(masked.contains("password=***"));
        assert!(masked.contains("host=localhost"));
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let settings = Settings::from_toml(
            r#"
            [pool]
            size = 4
            acquire_timeout_ms = 250

            [shards.second]
            host = "db2.internal"
            port = 6000

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.pool.size, 4);
        assert_eq!(settings.pool.acquire_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.shards.second.host, "db2.internal");
        assert_eq!(settings.shards.second.port, 6000);
        assert_eq!(settings.shards.first.port, 5430);
        assert_eq!(settings.bench.concurrency, 150);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.pool.size, 10);
        assert_eq!(settings.pool.acquire_timeout(), None);
        assert_eq!(settings.database, DbConfig::default());
    }
}
