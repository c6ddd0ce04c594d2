//! Request-scoped lookup cache.
//!
//! Memoizes attachment and file-record lookups for the lifetime of one
//! request. Negative results are cached too. Mutating operations evict the
//! identifiers they touch before they return; the cache is never shared
//! between requests.

use std::collections::HashMap;

use crate::models::{Attachment, FileRecord};

#[derive(Debug, Default)]
pub struct LookupCache {
    attachments: HashMap<String, Option<Attachment>>,
    files: HashMap<String, Option<FileRecord>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached attachment lookup. The outer `None` means "not cached".
    pub fn attachment(&self, id: &str) -> Option<Option<&Attachment>> {
        self.attachments.get(id).map(Option::as_ref)
    }

    pub fn store_attachment(&mut self, id: &str, found: Option<Attachment>) {
        self.attachments.insert(id.to_string(), found);
    }

    /// Cached file-record lookup. The outer `None` means "not cached".
    pub fn file(&self, hash: &str) -> Option<Option<&FileRecord>> {
        self.files.get(hash).map(Option::as_ref)
    }

    pub fn store_file(&mut self, hash: &str, found: Option<FileRecord>) {
        self.files.insert(hash.to_string(), found);
    }

    pub fn evict_attachment(&mut self, id: &str) {
        self.attachments.remove(id);
    }

    pub fn evict_file(&mut self, hash: &str) {
        self.files.remove(hash);
    }

    pub fn clear(&mut self) {
        self.attachments.clear();
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.attachments.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
