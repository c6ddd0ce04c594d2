//! Storage layout: sharded path allocation and filesystem primitives.
//!
//! Published content lives under `files/<h0>/<h1>/<hash>.<suffix>`, where
//! `h0` and `h1` are the first two characters of the content hash. Drafts
//! live flat under `drafts/<draft_id>`. All paths handed to the catalog are
//! relative to the storage root.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::defaults::{
    CONTENT_DIR, DRAFT_DIR, RANDOM_SUFFIX_LEN, TEMP_SUFFIX, THUMBNAIL_SUFFIX, VIEW_SUFFIX,
};
use crate::error::{Error, Result};

/// File written and removed by [`StorageLayout::validate`].
pub const HEALTH_CHECK_FILE: &str = ".health-check";

/// Filesystem layout rooted at the attachment storage directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a root-relative storage path.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Allocate the storage path for new content with the given hash.
    ///
    /// Creates the two shard directories if they are missing.
    ///
    /// Example: `files/6/4/6437b3ac....k3x9`
    pub async fn allocate_content_path(&self, hash: &str, suffix: &str) -> Result<String> {
        if !is_valid_content_hash(hash) {
            return Err(Error::InvalidInput(format!("malformed content hash: {:?}", hash)));
        }
        let dir = format!("{}/{}/{}", CONTENT_DIR, &hash[0..1], &hash[1..2]);
        self.ensure_dir(&dir).await?;
        Ok(format!("{}/{}.{}", dir, hash, suffix))
    }

    /// Allocate the storage path for a draft, creating `drafts/` if missing.
    pub async fn allocate_draft_path(&self, draft_id: &str) -> Result<String> {
        if !is_safe_draft_id(draft_id) {
            return Err(Error::InvalidInput(format!("unsafe draft id: {:?}", draft_id)));
        }
        self.ensure_dir(DRAFT_DIR).await?;
        Ok(format!("{}/{}", DRAFT_DIR, draft_id))
    }

    async fn ensure_dir(&self, relative: &str) -> Result<()> {
        let dir = self.root.join(relative);
        fs::create_dir_all(&dir).await.map_err(|e| {
            warn!(dir = %dir.display(), error = %e, "layout: create_dir_all failed");
            Error::NotWritable(format!("{}: {}", dir.display(), e))
        })
    }

    /// Atomically rename a stored file to a new root-relative path.
    pub async fn move_file(&self, from: &str, to: &str) -> Result<()> {
        let (source, target) = (self.absolute(from), self.absolute(to));
        fs::rename(&source, &target).await.map_err(|e| {
            warn!(from = %source.display(), to = %target.display(), error = %e, "layout: rename failed");
            Error::Io(e)
        })
    }

    /// Set the modification time of a stored file to now.
    ///
    /// A rename keeps the source's mtime; content moved into the store is
    /// touched so age-based sweeps measure it from the move.
    pub async fn touch(&self, relative: &str) -> Result<()> {
        let path = self.absolute(relative);
        let file = fs::OpenOptions::new().write(true).open(&path).await?;
        let file = file.into_std().await;
        tokio::task::spawn_blocking(move || file.set_modified(SystemTime::now()))
            .await
            .map_err(|e| Error::Internal(format!("touch task failed: {}", e)))??;
        Ok(())
    }

    /// Write data to a root-relative path: temp file, fsync, rename.
    ///
    /// The final file is left with 0644 permissions.
    pub async fn write_atomic(&self, relative: &str, data: &[u8]) -> Result<()> {
        let full_path = self.absolute(relative);
        debug!(storage_path = %relative, size = data.len(), "layout: write");

        let mut temp_name = full_path.as_os_str().to_os_string();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_name);
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "layout: File::create failed");
            e
        })?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "layout: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    /// Whether a root-relative path exists on disk.
    pub async fn exists(&self, relative: &str) -> Result<bool> {
        Ok(fs::try_exists(self.absolute(relative)).await?)
    }

    /// Remove a stored file and, when `with_siblings`, its `.view` and
    /// `.thumbnail` renditions.
    ///
    /// Missing files are not an error; other failures are logged and
    /// skipped. Returns the number of files actually removed.
    pub async fn remove_stored(&self, relative: &str, with_siblings: bool) -> usize {
        let primary = self.absolute(relative);
        let mut targets = vec![primary.clone()];
        if with_siblings {
            targets.extend(sibling_paths(&primary));
        }

        let mut removed = 0;
        for target in targets {
            match fs::remove_file(&target).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %target.display(), error = %e, "layout: remove_file failed");
                }
            }
        }
        removed
    }

    /// Validate that the storage root can create directories and write,
    /// read, and delete files.
    ///
    /// Performs a full round trip at startup so permission problems surface
    /// as a configuration error instead of failing the first publish.
    pub async fn validate(&self) -> Result<()> {
        self.ensure_dir(CONTENT_DIR).await?;
        self.ensure_dir(DRAFT_DIR).await?;

        let probe = format!("{}/{}", DRAFT_DIR, HEALTH_CHECK_FILE);
        let data = b"storage-health-check";
        let not_writable = |e: Error| Error::NotWritable(format!("{}: {}", self.root.display(), e));

        self.write_atomic(&probe, data).await.map_err(not_writable)?;
        let read_back = fs::read(self.absolute(&probe))
            .await
            .map_err(|e| not_writable(Error::Io(e)))?;
        if read_back != data {
            return Err(Error::NotWritable(format!(
                "{}: read-back mismatch",
                self.root.display()
            )));
        }
        fs::remove_file(self.absolute(&probe))
            .await
            .map_err(|e| not_writable(Error::Io(e)))?;

        Ok(())
    }
}

/// Paths of the renditions an external resizing worker writes next to a
/// resizable original.
pub fn sibling_paths(path: &Path) -> [PathBuf; 2] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [with_suffix(VIEW_SUFFIX), with_suffix(THUMBNAIL_SUFFIX)]
}

/// Random lowercase alphanumeric suffix for content file names.
pub fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// A content hash must be at least two ASCII alphanumerics to shard.
pub fn is_valid_content_hash(hash: &str) -> bool {
    hash.len() >= 2 && hash.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn is_safe_draft_id(draft_id: &str) -> bool {
    !draft_id.is_empty()
        && draft_id != "."
        && draft_id != ".."
        && !draft_id.contains(['/', '\\', '\0'])
}
