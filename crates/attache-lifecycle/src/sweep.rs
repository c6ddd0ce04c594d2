//! Draft expiry and trash reconciliation, plus the periodic sweep worker.

use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use attache_core::defaults::{
    self, CONTENT_DIR, DRAFT_DIR, TEMP_SUFFIX, THUMBNAIL_SUFFIX, TRASH_GRACE_SECS, VIEW_SUFFIX,
};
use attache_core::layout::HEALTH_CHECK_FILE;
use attache_core::{Catalog, CatalogTx, Result};

use crate::engine::LifecycleEngine;

/// Outcome of an expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub expired: usize,
    pub failed: usize,
}

/// Outcome of a trash reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrashReport {
    /// Root-relative paths with no owning file or draft record.
    pub orphans: Vec<String>,
    pub removed: usize,
}

impl LifecycleEngine {
    /// Delete every draft whose expiry is at or before `now`.
    pub async fn expire_drafts(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        let drafts = self.catalog().expired_drafts(now).await?;
        let mut report = ExpiryReport::default();

        for draft in &drafts {
            match self.delete_draft(draft).await {
                Ok(true) => report.expired += 1,
                // Published or deleted concurrently.
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        subsystem = "sweep",
                        op = "expire",
                        attachment_id = %draft.draft_id,
                        error = %e,
                        "Failed to expire draft"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            info!(
                subsystem = "sweep",
                op = "expire",
                expired = report.expired,
                failed = report.failed,
                "Draft expiry sweep complete"
            );
        }
        Ok(report)
    }

    /// Find stored files that no file or draft record owns, and remove
    /// them when `remove` is set. Sibling renditions follow their original.
    /// Files modified within the grace window are skipped.
    pub async fn reconcile_trash(&self, remove: bool) -> Result<TrashReport> {
        self.reconcile_trash_older_than(remove, Duration::from_secs(TRASH_GRACE_SECS))
            .await
    }

    pub async fn reconcile_trash_older_than(
        &self,
        remove: bool,
        grace: Duration,
    ) -> Result<TrashReport> {
        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut candidates = Vec::new();
        for dir in [CONTENT_DIR, DRAFT_DIR] {
            collect_files(self.layout().root(), dir, cutoff, &mut candidates).await?;
        }

        let mut report = TrashReport::default();
        let mut tx = self.catalog().begin().await?;
        for relative in candidates {
            if !is_owned(tx.as_mut(), &relative).await? {
                report.orphans.push(relative);
            }
        }
        tx.rollback().await?;

        if remove {
            for orphan in &report.orphans {
                if self.still_orphaned(orphan, cutoff).await? {
                    report.removed += self.layout().remove_stored(orphan, false).await;
                }
            }
        }

        if !report.orphans.is_empty() {
            info!(
                subsystem = "sweep",
                op = "reconcile",
                orphans = report.orphans.len(),
                removed = report.removed,
                "Trash reconciliation complete"
            );
        }
        Ok(report)
    }

    /// Re-check one orphan immediately before it is unlinked: it must still
    /// be older than `cutoff` and still unowned.
    async fn still_orphaned(&self, relative: &str, cutoff: SystemTime) -> Result<bool> {
        match fs::metadata(self.layout().absolute(relative)).await {
            Ok(metadata) if metadata.modified()? <= cutoff => {}
            Ok(_) => {
                debug!(subsystem = "sweep", path = %relative, "Orphan touched since scan");
                return Ok(false);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let mut tx = self.catalog().begin().await?;
        let owned = is_owned(tx.as_mut(), relative).await?;
        tx.rollback().await?;
        Ok(!owned)
    }
}

/// Whether a file or draft record owns a stored path or the original it is
/// a rendition of.
///
/// Content whose hash a live draft still carries counts as owned: a publish
/// moves the bytes before it commits the file record and deletes the draft
/// together. The draft is checked first so that one of the two rows is
/// always visible.
async fn is_owned(tx: &mut dyn CatalogTx, relative: &str) -> Result<bool> {
    let owner_path = strip_rendition_suffix(relative);
    if owner_path.starts_with(DRAFT_DIR) {
        return tx.draft_exists_at(owner_path).await;
    }
    if let Some(hash) = content_hash_of(owner_path) {
        if tx.draft_hash_exists(hash).await? {
            return Ok(true);
        }
    }
    tx.file_exists_at(owner_path).await
}

/// Content hash encoded in a `files/<h0>/<h1>/<hash>.<suffix>` path.
fn content_hash_of(relative: &str) -> Option<&str> {
    let name = relative.rsplit('/').next()?;
    let (hash, _suffix) = name.split_once('.')?;
    Some(hash).filter(|h| !h.is_empty())
}

fn strip_rendition_suffix(relative: &str) -> &str {
    relative
        .strip_suffix(VIEW_SUFFIX)
        .or_else(|| relative.strip_suffix(THUMBNAIL_SUFFIX))
        .unwrap_or(relative)
}

/// Walk `root/dir` and collect root-relative paths of regular files last
/// modified before `cutoff`.
async fn collect_files(
    root: &Path,
    dir: &str,
    cutoff: SystemTime,
    out: &mut Vec<String>,
) -> Result<()> {
    let mut pending = vec![dir.to_string()];
    while let Some(relative_dir) = pending.pop() {
        let mut entries = match fs::read_dir(root.join(&relative_dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = format!("{}/{}", relative_dir, name);
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending.push(relative);
                continue;
            }
            if !file_type.is_file() || name.ends_with(TEMP_SUFFIX) || name == HEALTH_CHECK_FILE {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            if modified > cutoff {
                debug!(subsystem = "sweep", path = %relative, "Skipping recent file");
                continue;
            }
            out.push(relative);
        }
    }
    out.sort();
    Ok(())
}

// =============================================================================
// WORKER
// =============================================================================

/// Periodic sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Seconds between sweeps; 0 disables the worker.
    pub interval_secs: u64,
    /// Whether reconciliation removes orphans or only reports them.
    pub remove_trash: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::SWEEP_INTERVAL_SECS,
            remove_trash: false,
        }
    }
}

impl SweepConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SWEEP_INTERVAL_SECS` | `3600` | Seconds between sweeps (0 disables) |
    /// | `SWEEP_REMOVE_TRASH` | `false` | Unlink orphaned files instead of reporting them |
    pub fn from_env() -> Self {
        let interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SWEEP_INTERVAL_SECS);

        let remove_trash = std::env::var("SWEEP_REMOVE_TRASH")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            interval_secs,
            remove_trash,
        }
    }

    pub fn enabled(&self) -> bool {
        self.interval_secs > 0
    }
}

/// Handle to a running sweep worker.
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweepHandle {
    /// Ask the worker to stop after its current pass.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Runs draft expiry and trash reconciliation on a fixed interval.
pub struct SweepWorker {
    engine: LifecycleEngine,
    config: SweepConfig,
}

impl SweepWorker {
    pub fn new(engine: LifecycleEngine, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    /// Spawn the worker loop and return a handle for shutdown.
    pub fn start(self) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        SweepHandle { shutdown_tx }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled() {
            info!(subsystem = "sweep", "Sweep worker is disabled, not starting");
            return;
        }

        info!(
            subsystem = "sweep",
            interval_secs = self.config.interval_secs,
            remove_trash = self.config.remove_trash,
            "Sweep worker started"
        );

        let interval = Duration::from_secs(self.config.interval_secs);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "sweep", "Sweep worker received shutdown signal");
                    break;
                }
                _ = sleep(interval) => {}
            }
            self.sweep_once().await;
        }
    }

    /// One pass: expire drafts, then reconcile trash.
    pub async fn sweep_once(&self) {
        if let Err(e) = self.engine.expire_drafts(Utc::now()).await {
            warn!(subsystem = "sweep", op = "expire", error = %e, "Draft expiry failed");
        }
        if let Err(e) = self.engine.reconcile_trash(self.config.remove_trash).await {
            warn!(subsystem = "sweep", op = "reconcile", error = %e, "Trash reconciliation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_rendition_suffix() {
        assert_eq!(
            strip_rendition_suffix("files/a/b/ab.k3x9.view"),
            "files/a/b/ab.k3x9"
        );
        assert_eq!(
            strip_rendition_suffix("files/a/b/ab.k3x9.thumbnail"),
            "files/a/b/ab.k3x9"
        );
        assert_eq!(strip_rendition_suffix("drafts/d1"), "drafts/d1");
    }

    #[test]
    fn test_content_hash_of() {
        assert_eq!(content_hash_of("files/a/b/ab12.k3x9"), Some("ab12"));
        assert_eq!(content_hash_of("files/a/b/ab12"), None);
        assert_eq!(content_hash_of("files/a/b/.k3x9"), None);
    }

    #[test]
    fn test_sweep_config_default() {
        let config = SweepConfig::default();
        assert_eq!(config.interval_secs, 3600);
        assert!(!config.remove_trash);
        assert!(config.enabled());
        assert!(!SweepConfig {
            interval_secs: 0,
            remove_trash: false
        }
        .enabled());
    }
}
