//! Centralized default constants for attache.
//!
//! Every crate references these instead of defining its own magic numbers.

// =============================================================================
// STORAGE LAYOUT
// =============================================================================

/// Directory (relative to the storage root) holding published content.
pub const CONTENT_DIR: &str = "files";

/// Directory (relative to the storage root) holding unpublished drafts.
pub const DRAFT_DIR: &str = "drafts";

/// Length of the random suffix appended to content file names.
pub const RANDOM_SUFFIX_LEN: usize = 4;

/// Suffix of the display-sized rendition written by the resizing worker.
pub const VIEW_SUFFIX: &str = ".view";

/// Suffix of the thumbnail rendition written by the resizing worker.
pub const THUMBNAIL_SUFFIX: &str = ".thumbnail";

/// Suffix of the in-flight file written before an atomic rename.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Default storage root when `ATTACHMENT_ROOT` is unset.
pub const STORAGE_ROOT: &str = "/var/lib/attache";

// =============================================================================
// DRAFTS
// =============================================================================

/// Hours an unpublished draft is kept before the expiry sweep removes it.
pub const DRAFT_TTL_HOURS: i64 = 24;

/// Seconds between periodic draft expiry sweeps (0 disables).
pub const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Files younger than this are never treated as trash; they may belong to
/// an intake or publish still in flight.
pub const TRASH_GRACE_SECS: u64 = 3600;

// =============================================================================
// PROBING
// =============================================================================

/// Bytes read from the head of a file for MIME sniffing.
pub const SNIFF_LEN: usize = 8192;

/// Read buffer size used while hashing file contents.
pub const HASH_BUFFER_LEN: usize = 64 * 1024;

/// Bytes read when decoding an image header; JPEG frames can sit behind
/// large metadata segments.
pub const IMAGE_HEADER_LEN: usize = 256 * 1024;

/// MIME type reported for zero-length files.
pub const MIME_EMPTY: &str = "application/x-empty";

/// MIME type reported when nothing more specific is recognised.
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

// =============================================================================
// SERVING
// =============================================================================

/// Cache lifetime for inline (non-download) responses.
pub const INLINE_CACHE_MAX_AGE_SECS: u64 = 3600;

/// Maximum accepted upload size in bytes.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
