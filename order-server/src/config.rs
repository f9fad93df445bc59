//! Server configuration

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where idempotency records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyBackend {
    /// `idempotency_keys` table, shared by every instance on the same database
    Postgres,
    /// Process-local, for single-instance deployments and tests
    Memory,
}

impl FromStr for IdempotencyBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub db_max_connections: u32,
    /// Lifetime of an idempotency record
    pub idempotency_ttl: Duration,
    pub idempotency_backend: IdempotencyBackend,
    /// Interval between expired-record sweeps
    pub idempotency_cleanup_interval: Duration,
    pub log_level: Option<String>,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            http_port: parse_or(&var, "HTTP_PORT", 8080)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
            idempotency_ttl: Duration::from_secs(
                parse_or(&var, "IDEMPOTENCY_TTL_SECS", 600u64)?.max(1),
            ),
            idempotency_backend: parse_or(
                &var,
                "IDEMPOTENCY_BACKEND",
                IdempotencyBackend::Postgres,
            )?,
            idempotency_cleanup_interval: Duration::from_secs(
                parse_or(&var, "IDEMPOTENCY_CLEANUP_SECS", 60u64)?.max(1),
            ),
            log_level: var("LOG_LEVEL"),
            log_json: var("LOG_JSON")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false),
            log_dir: var("LOG_DIR"),
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
