//! Catalog traits: the transactional persistence seam.
//!
//! The lifecycle engine composes content, draft, and attachment store
//! operations inside one [`CatalogTx`]; everything done through a single
//! transaction commits or rolls back together. Backends implement the
//! three store traits plus [`CatalogTx::commit`] / [`CatalogTx::rollback`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// The `(hash -> file record)` table.
#[async_trait]
pub trait ContentStore: Send {
    /// Look up a file record, holding a shared lock on it until the
    /// transaction ends so a concurrent delete cannot remove it underneath.
    async fn lookup_file(&mut self, hash: &str) -> Result<Option<FileRecord>>;

    /// Look up a file record and lock it exclusively (delete path).
    async fn lock_file(&mut self, hash: &str) -> Result<Option<FileRecord>>;

    /// Insert a new file record.
    ///
    /// Fails with `Error::DuplicateHash` when the hash already exists.
    async fn create_file(&mut self, record: &FileRecord) -> Result<()>;

    /// Number of attachment records bound to `hash`, computed live.
    async fn reference_count(&mut self, hash: &str) -> Result<i64>;

    /// Remove a file record. Callers must have established that its
    /// reference count is zero within the same transaction.
    async fn delete_file(&mut self, hash: &str) -> Result<bool>;

    /// Whether any file record owns `storage_path`.
    async fn file_exists_at(&mut self, storage_path: &str) -> Result<bool>;
}

/// The `(draft_id -> draft record)` table.
#[async_trait]
pub trait DraftStore: Send {
    async fn get_draft(&mut self, draft_id: &str) -> Result<Option<DraftRecord>>;

    /// Insert or replace a draft record.
    async fn put_draft(&mut self, record: &DraftRecord) -> Result<()>;

    async fn delete_draft(&mut self, draft_id: &str) -> Result<bool>;

    /// Drafts whose owner hint matches `owner`, oldest first.
    async fn list_drafts_by_owner(&mut self, owner: &Component) -> Result<Vec<DraftRecord>>;

    /// Drafts whose expiry is at or before `now`.
    async fn list_expired_drafts(&mut self, now: DateTime<Utc>) -> Result<Vec<DraftRecord>>;

    /// Whether any draft record owns `storage_path`.
    async fn draft_exists_at(&mut self, storage_path: &str) -> Result<bool>;

    /// Whether any draft record carries content hash `hash`.
    async fn draft_hash_exists(&mut self, hash: &str) -> Result<bool>;
}

/// The `(attachment_id -> attachment record)` table.
#[async_trait]
pub trait AttachmentStore: Send {
    async fn get_attachment(&mut self, attachment_id: &str) -> Result<Option<AttachmentRecord>>;

    async fn insert_attachment(&mut self, record: &AttachmentRecord) -> Result<()>;

    /// Rewrite the owning slot of an attachment. Returns `false` when the id
    /// does not exist.
    async fn update_attachment_slot(&mut self, attachment_id: &str, slot: &Slot) -> Result<bool>;

    async fn delete_attachment(&mut self, attachment_id: &str) -> Result<bool>;

    /// Ids of attachments occupying `slot`, excluding those in `except`,
    /// oldest first.
    async fn list_slot(&mut self, slot: &Slot, except: &[String]) -> Result<Vec<String>>;
}

// =============================================================================
// TRANSACTION / CATALOG
// =============================================================================

/// One atomic unit of work across the three stores.
///
/// Dropping a transaction without committing discards its changes.
#[async_trait]
pub trait CatalogTx: ContentStore + DraftStore + AttachmentStore + Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Resolve an identifier to its logical view: the published attachment
    /// joined with its file record, or else the draft of that id.
    async fn find_attachment(&mut self, id: &str) -> Result<Option<Attachment>> {
        if let Some(record) = self.get_attachment(id).await? {
            return match self.lookup_file(&record.hash).await? {
                Some(file) => Ok(Some(Attachment::Published { record, file })),
                None => Ok(None),
            };
        }
        Ok(self.get_draft(id).await?.map(Attachment::Draft))
    }
}

/// Entry point to a transactional persistence backend.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>>;

    /// Read-only convenience: resolve an identifier in its own transaction.
    async fn find_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let mut tx = self.begin().await?;
        let found = tx.find_attachment(id).await?;
        tx.rollback().await?;
        Ok(found)
    }

    /// Read-only convenience: fetch a file record in its own transaction.
    async fn find_file(&self, hash: &str) -> Result<Option<FileRecord>> {
        let mut tx = self.begin().await?;
        let found = tx.lookup_file(hash).await?;
        tx.rollback().await?;
        Ok(found)
    }

    /// Read-only convenience: ids in `slot` not listed in `except`.
    async fn slot_members(&self, slot: &Slot, except: &[String]) -> Result<Vec<String>> {
        let mut tx = self.begin().await?;
        let ids = tx.list_slot(slot, except).await?;
        tx.rollback().await?;
        Ok(ids)
    }

    /// Read-only convenience: pending drafts staged for `owner`.
    async fn drafts_by_owner(&self, owner: &Component) -> Result<Vec<DraftRecord>> {
        let mut tx = self.begin().await?;
        let drafts = tx.list_drafts_by_owner(owner).await?;
        tx.rollback().await?;
        Ok(drafts)
    }

    /// Read-only convenience: drafts expired at `now`.
    async fn expired_drafts(&self, now: DateTime<Utc>) -> Result<Vec<DraftRecord>> {
        let mut tx = self.begin().await?;
        let drafts = tx.list_expired_drafts(now).await?;
        tx.rollback().await?;
        Ok(drafts)
    }
}
