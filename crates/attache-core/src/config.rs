//! Storage configuration loaded from the environment.

use std::path::PathBuf;

use crate::defaults;

/// Configuration for the attachment storage root and draft lifetime.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding `files/` and `drafts/`.
    pub root: PathBuf,
    /// Hours a staged draft lives before it is eligible for expiry.
    pub draft_ttl_hours: i64,
    /// Cache lifetime for inline responses.
    pub cache_max_age_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(defaults::STORAGE_ROOT),
            draft_ttl_hours: defaults::DRAFT_TTL_HOURS,
            cache_max_age_secs: defaults::INLINE_CACHE_MAX_AGE_SECS,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ATTACHMENT_ROOT` | `/var/lib/attache` | Storage root directory |
    /// | `DRAFT_TTL_HOURS` | `24` | Draft lifetime before expiry |
    /// | `ATTACHMENT_CACHE_MAX_AGE_SECS` | `3600` | Inline response cache lifetime |
    pub fn from_env() -> Self {
        let root = std::env::var("ATTACHMENT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::STORAGE_ROOT));

        let draft_ttl_hours = std::env::var("DRAFT_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::DRAFT_TTL_HOURS)
            .max(1);

        let cache_max_age_secs = std::env::var("ATTACHMENT_CACHE_MAX_AGE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::INLINE_CACHE_MAX_AGE_SECS);

        Self {
            root,
            draft_ttl_hours,
            cache_max_age_secs,
        }
    }

    /// Use a different storage root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the draft lifetime in hours.
    pub fn with_draft_ttl_hours(mut self, hours: i64) -> Self {
        self.draft_ttl_hours = hours;
        self
    }
}
