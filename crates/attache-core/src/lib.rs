//! # attache-core
//!
//! Core types, traits, and abstractions for the attache attachment store.
//!
//! This crate provides the record types shared by every layer, the
//! transactional catalog traits that persistence backends implement, and
//! the two leaf components of the storage lifecycle: content probing and
//! sharded path allocation.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod layout;
pub mod models;
pub mod probe;
pub mod traits;

// Re-export commonly used types at crate root
pub use cache::LookupCache;
pub use config::StorageConfig;
pub use error::{Error, Result};
pub use layout::StorageLayout;
pub use models::*;
pub use probe::{
    classify_media_type, compute_content_hash, detect_mime, hash_file, normalize_extension,
    probe_file, Probe,
};
pub use traits::*;
