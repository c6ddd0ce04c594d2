//! Server configuration.

use attache_core::defaults;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: "postgres://localhost/attache".to_string(),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `DATABASE_URL` | `postgres://localhost/attache` | Catalog database |
    /// | `MAX_UPLOAD_BYTES` | `52428800` | Request body limit for uploads |
    pub fn from_env() -> Self {
        let fallback = Self::default();

        let host = std::env::var("HOST").unwrap_or(fallback.host);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(fallback.port);
        let database_url = std::env::var("DATABASE_URL").unwrap_or(fallback.database_url);
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(fallback.max_upload_bytes);

        Self {
            host,
            port,
            database_url,
            max_upload_bytes,
        }
    }
}
