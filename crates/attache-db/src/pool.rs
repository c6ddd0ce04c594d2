//! PostgreSQL pool setup for the catalog.
//!
//! Publish and delete hold row locks for the length of a catalog
//! transaction, so the pool carries a server-side `statement_timeout` and
//! identifies itself with an `application_name` for `pg_stat_activity`.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use attache_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;
pub const APPLICATION_NAME: &str = "attache";

/// Catalog pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a catalog transaction waits for a free connection.
    pub acquire_timeout: Duration,
    /// Server-side cap per statement; zero leaves the server default.
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            statement_timeout: Duration::from_millis(DEFAULT_STATEMENT_TIMEOUT_MS),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DB_MAX_CONNECTIONS` | `10` | Pool size upper bound |
    /// | `DB_MIN_CONNECTIONS` | `1` | Connections kept open when idle |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    /// | `DB_STATEMENT_TIMEOUT_MS` | `30000` | Per-statement cap (0 = server default) |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_connections = env_number::<u32>("DB_MAX_CONNECTIONS")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_connections);
        let min_connections = env_number::<u32>("DB_MIN_CONNECTIONS")
            .unwrap_or(defaults.min_connections)
            .min(max_connections);

        Self {
            max_connections,
            min_connections,
            acquire_timeout: env_number::<u64>("DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            statement_timeout: env_number::<u64>("DB_STATEMENT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.statement_timeout),
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Connection options for `database_url` with the catalog's session
    /// settings applied.
    pub fn connect_options(&self, database_url: &str) -> Result<PgConnectOptions> {
        let options = database_url
            .parse::<PgConnectOptions>()
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {}", e)))?
            .application_name(APPLICATION_NAME);

        let millis = self.statement_timeout.as_millis();
        if millis == 0 {
            return Ok(options);
        }
        Ok(options.options([("statement_timeout", millis.to_string())]))
    }
}

/// Connect a pool with default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect a pool with explicit settings.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let started = Instant::now();
    let connect_options = config.connect_options(database_url)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    info!(
        subsystem = "catalog",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        statement_timeout_ms = config.statement_timeout.as_millis() as u64,
        duration_ms = started.elapsed().as_millis() as u64,
        "Catalog pool connected"
    );
    Ok(pool)
}

/// Log pool occupancy; warns when every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();
    debug!(
        subsystem = "catalog",
        component = "pool",
        pool_size = size,
        pool_idle = idle,
        "Pool occupancy"
    );
    if size > 0 && idle == 0 {
        warn!(
            subsystem = "catalog",
            component = "pool",
            pool_size = size,
            "No idle catalog connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = PoolConfig::new()
            .max_connections(4)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .statement_timeout(Duration::ZERO);

        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert!(config.statement_timeout.is_zero());
    }

    #[test]
    fn test_connect_options_reject_bad_url() {
        let err = PoolConfig::default()
            .connect_options("not a url")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_connect_options_apply_session_settings() {
        let options = PoolConfig::default()
            .connect_options("postgres://attache@localhost:5432/attache")
            .unwrap();
        assert_eq!(options.get_application_name(), Some(APPLICATION_NAME));
        assert_eq!(options.get_database(), Some("attache"));
    }
}
