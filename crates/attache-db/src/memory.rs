//! Process-local catalog.
//!
//! Transactions are serialized: [`MemoryCatalog::begin`] takes an owned lock
//! on the shared state and works on a copy of it. `commit` writes the copy
//! back; dropping or rolling back discards it. A caller must not open a
//! second transaction while holding one.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use attache_core::{
    AttachmentRecord, AttachmentStore, Catalog, CatalogTx, Component, ContentStore, DraftRecord,
    DraftStore, Error, FileRecord, Result, Slot,
};

/// The three tables.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub files: BTreeMap<String, FileRecord>,
    pub drafts: BTreeMap<String, DraftRecord>,
    pub attachments: BTreeMap<String, AttachmentRecord>,
}

impl CatalogState {
    fn references(&self, hash: &str) -> usize {
        self.attachments.values().filter(|a| a.hash == hash).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> CatalogState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryCatalogTx { guard, working }))
    }
}

pub struct MemoryCatalogTx {
    guard: OwnedMutexGuard<CatalogState>,
    working: CatalogState,
}

#[async_trait]
impl ContentStore for MemoryCatalogTx {
    async fn lookup_file(&mut self, hash: &str) -> Result<Option<FileRecord>> {
        Ok(self.working.files.get(hash).cloned())
    }

    async fn lock_file(&mut self, hash: &str) -> Result<Option<FileRecord>> {
        Ok(self.working.files.get(hash).cloned())
    }

    async fn create_file(&mut self, record: &FileRecord) -> Result<()> {
        if self.working.files.contains_key(&record.hash) {
            return Err(Error::DuplicateHash(record.hash.clone()));
        }
        self.working
            .files
            .insert(record.hash.clone(), record.clone());
        Ok(())
    }

    async fn reference_count(&mut self, hash: &str) -> Result<i64> {
        Ok(self.working.references(hash) as i64)
    }

    async fn delete_file(&mut self, hash: &str) -> Result<bool> {
        if self.working.references(hash) > 0 {
            return Err(Error::InvalidInput(format!(
                "file {} is still referenced",
                hash
            )));
        }
        Ok(self.working.files.remove(hash).is_some())
    }

    async fn file_exists_at(&mut self, storage_path: &str) -> Result<bool> {
        Ok(self
            .working
            .files
            .values()
            .any(|f| f.storage_path == storage_path))
    }
}

#[async_trait]
impl DraftStore for MemoryCatalogTx {
    async fn get_draft(&mut self, draft_id: &str) -> Result<Option<DraftRecord>> {
        Ok(self.working.drafts.get(draft_id).cloned())
    }

    async fn put_draft(&mut self, record: &DraftRecord) -> Result<()> {
        self.working
            .drafts
            .insert(record.draft_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_draft(&mut self, draft_id: &str) -> Result<bool> {
        Ok(self.working.drafts.remove(draft_id).is_some())
    }

    async fn list_drafts_by_owner(&mut self, owner: &Component) -> Result<Vec<DraftRecord>> {
        let mut drafts: Vec<DraftRecord> = self
            .working
            .drafts
            .values()
            .filter(|d| d.owner.as_ref() == Some(owner))
            .cloned()
            .collect();
        drafts.sort_by(|a, b| {
            (a.created_at, &a.draft_id).cmp(&(b.created_at, &b.draft_id))
        });
        Ok(drafts)
    }

    async fn list_expired_drafts(&mut self, now: DateTime<Utc>) -> Result<Vec<DraftRecord>> {
        let mut drafts: Vec<DraftRecord> = self
            .working
            .drafts
            .values()
            .filter(|d| d.expires_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        drafts.sort_by(|a, b| {
            (a.expires_at, &a.draft_id).cmp(&(b.expires_at, &b.draft_id))
        });
        Ok(drafts)
    }

    async fn draft_exists_at(&mut self, storage_path: &str) -> Result<bool> {
        Ok(self
            .working
            .drafts
            .values()
            .any(|d| d.storage_path == storage_path))
    }

    async fn draft_hash_exists(&mut self, hash: &str) -> Result<bool> {
        Ok(self
            .working
            .drafts
            .values()
            .any(|d| d.hash.as_deref() == Some(hash)))
    }
}

#[async_trait]
impl AttachmentStore for MemoryCatalogTx {
    async fn get_attachment(&mut self, attachment_id: &str) -> Result<Option<AttachmentRecord>> {
        Ok(self.working.attachments.get(attachment_id).cloned())
    }

    async fn insert_attachment(&mut self, record: &AttachmentRecord) -> Result<()> {
        if !self.working.files.contains_key(&record.hash) {
            return Err(Error::InvalidInput(format!(
                "attachment {} references unknown file {}",
                record.attachment_id, record.hash
            )));
        }
        if self.working.attachments.contains_key(&record.attachment_id) {
            return Err(Error::InvalidInput(format!(
                "attachment {} already exists",
                record.attachment_id
            )));
        }
        self.working
            .attachments
            .insert(record.attachment_id.clone(), record.clone());
        Ok(())
    }

    async fn update_attachment_slot(&mut self, attachment_id: &str, slot: &Slot) -> Result<bool> {
        match self.working.attachments.get_mut(attachment_id) {
            Some(record) => {
                record.slot = slot.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_attachment(&mut self, attachment_id: &str) -> Result<bool> {
        Ok(self.working.attachments.remove(attachment_id).is_some())
    }

    async fn list_slot(&mut self, slot: &Slot, except: &[String]) -> Result<Vec<String>> {
        let mut members: Vec<&AttachmentRecord> = self
            .working
            .attachments
            .values()
            .filter(|a| &a.slot == slot && !except.contains(&a.attachment_id))
            .collect();
        members.sort_by(|a, b| {
            (a.created_at, &a.attachment_id).cmp(&(b.created_at, &b.attachment_id))
        });
        Ok(members.into_iter().map(|a| a.attachment_id.clone()).collect())
    }
}

#[async_trait]
impl CatalogTx for MemoryCatalogTx {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryCatalogTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache_core::MediaType;

    fn file(hash: &str) -> FileRecord {
        FileRecord {
            hash: hash.to_string(),
            storage_path: format!("files/{}/{}/{}.abcd", &hash[0..1], &hash[1..2], hash),
            media_type: MediaType::Text,
            mime_type: "text/plain".to_string(),
            extension: "txt".to_string(),
            byte_size: 3,
            width: 0,
            height: 0,
            created_at: Utc::now(),
        }
    }

    fn attachment(id: &str, hash: &str, slot: &Slot) -> AttachmentRecord {
        AttachmentRecord {
            attachment_id: id.to_string(),
            hash: hash.to_string(),
            slot: slot.clone(),
            display_name: format!("{}.txt", id),
            created_at: Utc::now(),
        }
    }

    fn slot() -> Slot {
        Slot::new(Component::new("module", "board"), "post", 1)
    }

    #[tokio::test]
    async fn test_commit_persists_and_drop_discards() {
        let catalog = MemoryCatalog::new();

        let mut tx = catalog.begin().await.unwrap();
        tx.create_file(&file("ab01")).await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = catalog.begin().await.unwrap();
            tx.create_file(&file("cd02")).await.unwrap();
            // dropped without commit
        }

        let state = catalog.snapshot().await;
        assert!(state.files.contains_key("ab01"));
        assert!(!state.files.contains_key("cd02"));
    }

    #[tokio::test]
    async fn test_create_file_rejects_duplicate_hash() {
        let catalog = MemoryCatalog::new();
        let mut tx = catalog.begin().await.unwrap();
        tx.create_file(&file("ab01")).await.unwrap();
        let err = tx.create_file(&file("ab01")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateHash(h) if h == "ab01"));
    }

    #[tokio::test]
    async fn test_reference_count_is_live() {
        let catalog = MemoryCatalog::new();
        let mut tx = catalog.begin().await.unwrap();
        tx.create_file(&file("ab01")).await.unwrap();
        tx.insert_attachment(&attachment("a1", "ab01", &slot()))
            .await
            .unwrap();
        tx.insert_attachment(&attachment("a2", "ab01", &slot()))
            .await
            .unwrap();
        assert_eq!(tx.reference_count("ab01").await.unwrap(), 2);

        assert!(tx.delete_file("ab01").await.is_err());
        tx.delete_attachment("a1").await.unwrap();
        tx.delete_attachment("a2").await.unwrap();
        assert_eq!(tx.reference_count("ab01").await.unwrap(), 0);
        assert!(tx.delete_file("ab01").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_attachment_requires_file() {
        let catalog = MemoryCatalog::new();
        let mut tx = catalog.begin().await.unwrap();
        let err = tx
            .insert_attachment(&attachment("a1", "ffff", &slot()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_slot_excludes_ids() {
        let catalog = MemoryCatalog::new();
        let other = Slot::new(Component::new("module", "board"), "post", 2);

        let mut tx = catalog.begin().await.unwrap();
        tx.create_file(&file("ab01")).await.unwrap();
        tx.insert_attachment(&attachment("a1", "ab01", &slot()))
            .await
            .unwrap();
        tx.insert_attachment(&attachment("a2", "ab01", &slot()))
            .await
            .unwrap();
        tx.insert_attachment(&attachment("a3", "ab01", &other))
            .await
            .unwrap();

        let mut members = tx.list_slot(&slot(), &[]).await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a1", "a2"]);
        assert_eq!(
            tx.list_slot(&slot(), &["a1".to_string()]).await.unwrap(),
            vec!["a2"]
        );
        assert!(tx.update_attachment_slot("a3", &slot()).await.unwrap());
        assert!(!tx.update_attachment_slot("zz", &slot()).await.unwrap());
        assert_eq!(tx.list_slot(&other, &[]).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_expired_drafts() {
        let catalog = MemoryCatalog::new();
        let now = Utc::now();
        let draft = |id: &str, expires_at: Option<DateTime<Utc>>| DraftRecord {
            draft_id: id.to_string(),
            storage_path: format!("drafts/{}", id),
            name: "a.txt".to_string(),
            hash: None,
            media_type: MediaType::Text,
            mime_type: "text/plain".to_string(),
            extension: "txt".to_string(),
            byte_size: 1,
            width: 0,
            height: 0,
            owner: Some(Component::new("module", "board")),
            created_at: now,
            expires_at,
        };

        let mut tx = catalog.begin().await.unwrap();
        tx.put_draft(&draft("old", Some(now - chrono::Duration::hours(1))))
            .await
            .unwrap();
        tx.put_draft(&draft("new", Some(now + chrono::Duration::hours(1))))
            .await
            .unwrap();
        tx.put_draft(&draft("forever", None)).await.unwrap();
        tx.commit().await.unwrap();

        let expired = catalog.expired_drafts(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].draft_id, "old");

        let mut tx = catalog.begin().await.unwrap();
        let owned = tx
            .list_drafts_by_owner(&Component::new("module", "board"))
            .await
            .unwrap();
        assert_eq!(owned.len(), 3);
        assert!(tx.draft_exists_at("drafts/new").await.unwrap());
        assert!(!tx.draft_exists_at("drafts/missing").await.unwrap());
    }
}
