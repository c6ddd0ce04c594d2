//! # attache-db
//!
//! Persistence backends for the attache attachment store.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgCatalog`]: the PostgreSQL catalog used in production
//! - [`MemoryCatalog`]: a process-local catalog for embedding and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use attache_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/attache").await?;
//!     db.migrate().await?;
//!     let catalog = db.catalog();
//!     Ok(())
//! }
//! ```

pub mod memory;
pub mod pg;
pub mod pool;

// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use attache_core::*;

pub use memory::{CatalogState, MemoryCatalog};
pub use pg::PgCatalog;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Database context: the pool plus the catalog built on it.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    catalog: PgCatalog,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            catalog: PgCatalog::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn catalog(&self) -> PgCatalog {
        self.catalog.clone()
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
