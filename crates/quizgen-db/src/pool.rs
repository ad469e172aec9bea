//! Connection pool setup for the orchestrator database.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use quizgen_core::{defaults, Error, Result};

/// Pool settings. Generation keeps a connection only between AI calls, so a
/// small pool is enough for one orchestrator process.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Reported as `application_name`, visible in `pg_stat_activity`.
    pub application_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::DB_IDLE_TIMEOUT_SECS),
            application_name: defaults::DB_APPLICATION_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `QUIZGEN_DB_MAX_CONNECTIONS`,
    /// `QUIZGEN_DB_ACQUIRE_TIMEOUT_SECS`, `QUIZGEN_DB_IDLE_TIMEOUT_SECS` and
    /// `QUIZGEN_DB_APPLICATION_NAME`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(n) = lookup("QUIZGEN_DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            config.max_connections = n;
        }
        if let Some(secs) = lookup("QUIZGEN_DB_ACQUIRE_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("QUIZGEN_DB_IDLE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(name) = lookup("QUIZGEN_DB_APPLICATION_NAME").filter(|v| !v.trim().is_empty())
        {
            config.application_name = name;
        }
        config
    }
}

/// Connect with default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| Error::Config(format!("invalid database url: {}", e)))?
        .application_name(&config.application_name);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        application_name = %config.application_name,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}
