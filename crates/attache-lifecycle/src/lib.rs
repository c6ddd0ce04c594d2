//! # attache-lifecycle
//!
//! The storage lifecycle of the attache attachment store: staging drafts,
//! publishing them into the content-addressed store, replacing slot
//! contents, reference-counted deletion, and serving.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use attache_core::{Component, Slot, StorageConfig};
//! use attache_db::MemoryCatalog;
//! use attache_lifecycle::LifecycleEngine;
//!
//! let engine = LifecycleEngine::new(Arc::new(MemoryCatalog::new()), StorageConfig::from_env());
//! let mut scope = engine.scope();
//! scope.stage_draft("d1", "notes.txt", b"abc", None).await?;
//! let slot = Slot::new(Component::new("module", "board"), "post", 7);
//! assert!(scope.publish(Some("d1"), &slot, false).await?);
//! ```

pub mod engine;
pub mod gateway;
pub mod sweep;

pub use engine::{LifecycleEngine, RequestScope};
pub use gateway::ServeHeaders;
pub use sweep::{ExpiryReport, SweepConfig, SweepHandle, SweepWorker, TrashReport};
