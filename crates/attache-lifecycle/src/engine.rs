//! Lifecycle engine: publish, replace, and delete.
//!
//! States per identifier are `Draft -> Published -> Deleted`. Publishing a
//! draft moves its bytes into the content store (or drops them on a dedup
//! hit) and binds an attachment record to a slot; republishing only rewrites
//! the slot. Deleting the last attachment of a hash deletes its file record
//! and then its bytes.
//!
//! Entry points return `Ok(false)` for every recoverable failure so batches
//! keep going; only fatal errors ([`Error::is_fatal`]) surface as `Err`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use attache_core::layout::random_suffix;
use attache_core::{
    compute_content_hash, hash_file, normalize_extension, probe_file, Attachment,
    AttachmentRecord, Catalog, CatalogTx, Component, DraftRecord, Error, FileRecord, LookupCache,
    Result, Slot, StorageConfig, StorageLayout,
};

/// Orchestrates the three stores and the filesystem.
#[derive(Clone)]
pub struct LifecycleEngine {
    catalog: Arc<dyn Catalog>,
    layout: StorageLayout,
    config: StorageConfig,
}

impl LifecycleEngine {
    pub fn new(catalog: Arc<dyn Catalog>, config: StorageConfig) -> Self {
        Self {
            catalog,
            layout: StorageLayout::from_config(&config),
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Open a request scope with a fresh lookup cache.
    pub fn scope(&self) -> RequestScope<'_> {
        RequestScope {
            engine: self,
            cache: LookupCache::new(),
        }
    }

    /// Drafts staged for `owner` and not yet published, oldest first.
    pub async fn pending_drafts(&self, owner: &Component) -> Result<Vec<DraftRecord>> {
        self.catalog.drafts_by_owner(owner).await
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Draft -> Published. Returns `Ok(false)` when the draft vanished or its
    /// bytes are missing.
    async fn publish_draft(&self, draft: &DraftRecord, slot: &Slot) -> Result<bool> {
        if !self.layout.exists(&draft.storage_path).await? {
            warn!(
                subsystem = "lifecycle",
                op = "publish",
                attachment_id = %draft.draft_id,
                storage_path = %draft.storage_path,
                "Draft bytes missing"
            );
            return Ok(false);
        }

        let hash = match &draft.hash {
            Some(hash) => hash.clone(),
            None => hash_file(&self.layout.absolute(&draft.storage_path)).await?,
        };

        let mut tx = self.catalog.begin().await?;
        // Another request may have published or deleted it since resolution.
        let draft = match tx.get_draft(&draft.draft_id).await? {
            Some(current) => current,
            None => {
                tx.rollback().await?;
                return Ok(false);
            }
        };

        let mut moved_to = None;
        let bound = self
            .bind_draft(tx.as_mut(), &draft, &hash, slot, &mut moved_to)
            .await;

        let existing = match bound {
            Ok(existing) => match tx.commit().await {
                Ok(()) => existing,
                Err(e) => {
                    self.restore_draft_bytes(&draft, moved_to.as_deref()).await;
                    return Err(e);
                }
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        subsystem = "lifecycle",
                        op = "publish",
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                self.restore_draft_bytes(&draft, moved_to.as_deref()).await;
                return Err(e);
            }
        };

        if let Some(stored_path) = &existing {
            if *stored_path != draft.storage_path {
                self.layout.remove_stored(&draft.storage_path, true).await;
            }
        }

        info!(
            subsystem = "lifecycle",
            op = "publish",
            attachment_id = %draft.draft_id,
            hash = %hash,
            dedup = existing.is_some(),
            "Draft published"
        );
        Ok(true)
    }

    /// Transactional part of publishing a draft. Returns the storage path of
    /// the content that was already stored (dedup hit), or `None` when the
    /// draft bytes became the stored content. `moved_to` records where the
    /// draft bytes were renamed so the caller can move them back on failure.
    async fn bind_draft(
        &self,
        tx: &mut dyn CatalogTx,
        draft: &DraftRecord,
        hash: &str,
        slot: &Slot,
        moved_to: &mut Option<String>,
    ) -> Result<Option<String>> {
        let existing = match tx.lookup_file(hash).await? {
            Some(file) => {
                debug!(
                    subsystem = "lifecycle",
                    op = "publish",
                    hash = %hash,
                    storage_path = %file.storage_path,
                    "Content already stored"
                );
                Some(file.storage_path)
            }
            None => {
                let content_path = self
                    .layout
                    .allocate_content_path(hash, &random_suffix())
                    .await?;
                self.layout
                    .move_file(&draft.storage_path, &content_path)
                    .await?;
                *moved_to = Some(content_path.clone());
                self.layout.touch(&content_path).await?;

                let record = FileRecord {
                    hash: hash.to_string(),
                    storage_path: content_path.clone(),
                    media_type: draft.media_type,
                    mime_type: draft.mime_type.clone(),
                    extension: draft.extension.clone(),
                    byte_size: draft.byte_size,
                    width: draft.width,
                    height: draft.height,
                    created_at: Utc::now(),
                };

                match tx.create_file(&record).await {
                    Ok(()) => None,
                    Err(Error::DuplicateHash(_)) => {
                        // A concurrent publisher stored the same content first.
                        self.layout
                            .move_file(&content_path, &draft.storage_path)
                            .await?;
                        *moved_to = None;
                        let Some(file) = tx.lookup_file(hash).await? else {
                            return Err(Error::Internal(format!(
                                "file record {} vanished after conflict",
                                hash
                            )));
                        };
                        debug!(
                            subsystem = "lifecycle",
                            op = "publish",
                            hash = %hash,
                            "Lost create race, using existing content"
                        );
                        Some(file.storage_path)
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let record = AttachmentRecord {
            attachment_id: draft.draft_id.clone(),
            hash: hash.to_string(),
            slot: slot.clone(),
            display_name: draft.name.clone(),
            created_at: Utc::now(),
        };
        tx.insert_attachment(&record).await?;
        tx.delete_draft(&draft.draft_id).await?;

        Ok(existing)
    }

    async fn restore_draft_bytes(&self, draft: &DraftRecord, moved_to: Option<&str>) {
        let Some(content_path) = moved_to else {
            return;
        };
        if let Err(e) = self
            .layout
            .move_file(content_path, &draft.storage_path)
            .await
        {
            warn!(
                subsystem = "lifecycle",
                op = "publish",
                attachment_id = %draft.draft_id,
                storage_path = %content_path,
                error = %e,
                "Failed to move bytes back to draft path"
            );
        }
    }

    /// Published -> Published: rewrite the owning slot only.
    async fn rebind(&self, attachment_id: &str, slot: &Slot) -> Result<bool> {
        let mut tx = self.catalog.begin().await?;
        if !tx.update_attachment_slot(attachment_id, slot).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;

        debug!(
            subsystem = "lifecycle",
            op = "publish",
            attachment_id = %attachment_id,
            "Attachment rebound"
        );
        Ok(true)
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Delete a published attachment, and its content when it was the last
    /// reference.
    async fn delete_published(&self, record: &AttachmentRecord) -> Result<bool> {
        let mut tx = self.catalog.begin().await?;
        let file = tx.lock_file(&record.hash).await?;
        if !tx.delete_attachment(&record.attachment_id).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        let mut orphaned = None;
        if let Some(file) = file {
            if tx.reference_count(&record.hash).await? == 0 {
                tx.delete_file(&record.hash).await?;
                orphaned = Some(file);
            }
        }
        tx.commit().await?;

        if let Some(file) = &orphaned {
            let removed = self
                .layout
                .remove_stored(&file.storage_path, file.media_type.is_resizable())
                .await;
            debug!(
                subsystem = "lifecycle",
                op = "delete",
                hash = %file.hash,
                storage_path = %file.storage_path,
                removed,
                "Last reference gone, content removed"
            );
        }

        info!(
            subsystem = "lifecycle",
            op = "delete",
            attachment_id = %record.attachment_id,
            hash = %record.hash,
            content_removed = orphaned.is_some(),
            "Attachment deleted"
        );
        Ok(true)
    }

    /// Delete a draft row and its temp file.
    pub(crate) async fn delete_draft(&self, draft: &DraftRecord) -> Result<bool> {
        let mut tx = self.catalog.begin().await?;
        if !tx.delete_draft(&draft.draft_id).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;

        self.layout.remove_stored(&draft.storage_path, true).await;
        info!(
            subsystem = "lifecycle",
            op = "delete",
            attachment_id = %draft.draft_id,
            "Draft deleted"
        );
        Ok(true)
    }

    // =========================================================================
    // INTAKE
    // =========================================================================

    /// Write uploaded bytes to a draft path and record the draft.
    async fn stage(
        &self,
        draft_id: &str,
        name: &str,
        data: &[u8],
        owner: Option<Component>,
    ) -> Result<DraftRecord> {
        let storage_path = self.layout.allocate_draft_path(draft_id).await?;
        self.layout.write_atomic(&storage_path, data).await?;

        let recorded = self
            .record_draft(draft_id, name, data, owner, &storage_path)
            .await;
        if recorded.is_err() {
            self.layout.remove_stored(&storage_path, false).await;
        }
        recorded
    }

    async fn record_draft(
        &self,
        draft_id: &str,
        name: &str,
        data: &[u8],
        owner: Option<Component>,
        storage_path: &str,
    ) -> Result<DraftRecord> {
        let probe = probe_file(&self.layout.absolute(storage_path)).await?;
        let now = Utc::now();
        let record = DraftRecord {
            draft_id: draft_id.to_string(),
            storage_path: storage_path.to_string(),
            name: name.to_string(),
            hash: Some(compute_content_hash(data)),
            media_type: probe.media_type,
            mime_type: probe.mime_type,
            extension: normalize_extension(name),
            byte_size: probe.byte_size,
            width: probe.width,
            height: probe.height,
            owner,
            created_at: now,
            expires_at: Some(now + Duration::hours(self.config.draft_ttl_hours)),
        };

        let mut tx = self.catalog.begin().await?;
        if tx.get_attachment(draft_id).await?.is_some() {
            tx.rollback().await?;
            return Err(Error::InvalidInput(format!(
                "attachment {} is already published",
                draft_id
            )));
        }
        tx.put_draft(&record).await?;
        tx.commit().await?;

        info!(
            subsystem = "lifecycle",
            op = "stage",
            attachment_id = %draft_id,
            mime_type = %record.mime_type,
            byte_size = record.byte_size,
            "Draft staged"
        );
        Ok(record)
    }
}

/// Report recoverable failures as `false`; propagate fatal ones.
fn settle(op: &'static str, id: &str, result: Result<bool>) -> Result<bool> {
    match result {
        Ok(done) => Ok(done),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(
                subsystem = "lifecycle",
                op,
                attachment_id = %id,
                error = %e,
                "Operation failed"
            );
            Ok(false)
        }
    }
}

// =============================================================================
// REQUEST SCOPE
// =============================================================================

/// One logical request against the engine.
///
/// Lookups are memoized in a [`LookupCache`] owned by the scope, including
/// negative results. Mutations evict the identifiers they touch.
pub struct RequestScope<'a> {
    engine: &'a LifecycleEngine,
    cache: LookupCache,
}

impl<'a> RequestScope<'a> {
    pub fn engine(&self) -> &'a LifecycleEngine {
        self.engine
    }

    /// Resolve an identifier to a draft or a published attachment.
    pub async fn get_attachment(&mut self, id: &str) -> Result<Option<Attachment>> {
        if let Some(cached) = self.cache.attachment(id) {
            return Ok(cached.cloned());
        }
        let found = self.engine.catalog.find_attachment(id).await?;
        if let Some(Attachment::Published { file, .. }) = &found {
            self.cache.store_file(&file.hash, Some(file.clone()));
        }
        self.cache.store_attachment(id, found.clone());
        Ok(found)
    }

    /// Fetch the file record for a content hash.
    pub async fn get_file(&mut self, hash: &str) -> Result<Option<FileRecord>> {
        if let Some(cached) = self.cache.file(hash) {
            return Ok(cached.cloned());
        }
        let found = self.engine.catalog.find_file(hash).await?;
        self.cache.store_file(hash, found.clone());
        Ok(found)
    }

    fn evict(&mut self, id: &str, hash: Option<&str>) {
        self.cache.evict_attachment(id);
        if let Some(hash) = hash {
            self.cache.evict_file(hash);
        }
    }

    /// Publish a draft or rebind a published attachment into `slot`.
    ///
    /// With no identifier, `replace` clears the slot and the call succeeds.
    /// With `replace`, every other attachment in the slot is deleted after a
    /// successful publish.
    pub async fn publish(
        &mut self,
        attachment_id: Option<&str>,
        slot: &Slot,
        replace: bool,
    ) -> Result<bool> {
        let Some(id) = attachment_id else {
            if replace {
                self.clear_slot(slot, &[]).await?;
            }
            return Ok(true);
        };

        let result = self.publish_one(id, slot).await;
        let published = settle("publish", id, result)?;

        if published && replace {
            self.clear_slot(slot, &[id.to_string()]).await?;
        }
        Ok(published)
    }

    async fn publish_one(&mut self, id: &str, slot: &Slot) -> Result<bool> {
        let Some(attachment) = self.get_attachment(id).await? else {
            return Err(Error::NotFound(id.to_string()));
        };

        let hash = attachment.hash().map(str::to_string);
        let result = match &attachment {
            Attachment::Draft(draft) => self.engine.publish_draft(draft, slot).await,
            Attachment::Published { record, .. } => {
                self.engine.rebind(&record.attachment_id, slot).await
            }
        };
        self.evict(id, hash.as_deref());
        result
    }

    /// Publish each id into `slot`; with `replace`, delete every other
    /// attachment in the slot once all of them succeeded.
    pub async fn publish_many(&mut self, ids: &[String], slot: &Slot, replace: bool) -> Result<bool> {
        let mut all = true;
        for id in ids {
            all &= self.publish(Some(id.as_str()), slot, false).await?;
        }

        if all && replace {
            self.clear_slot(slot, ids).await?;
        }
        Ok(all)
    }

    /// Delete every attachment in `slot` not listed in `keep`.
    async fn clear_slot(&mut self, slot: &Slot, keep: &[String]) -> Result<bool> {
        let members = match self.engine.catalog.slot_members(slot, keep).await {
            Ok(members) => members,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    subsystem = "lifecycle",
                    op = "replace",
                    error = %e,
                    "Failed to list slot"
                );
                return Ok(false);
            }
        };
        if members.is_empty() {
            return Ok(true);
        }

        debug!(
            subsystem = "lifecycle",
            op = "replace",
            component_type = %slot.component.component_type,
            component_name = %slot.component.component_name,
            position_type = %slot.position_type,
            position_id = %slot.position_id,
            count = members.len(),
            "Clearing slot"
        );
        self.delete_attachments(&members).await
    }

    /// Delete a draft or a published attachment.
    pub async fn delete_attachment(&mut self, id: &str) -> Result<bool> {
        let result = self.delete_one(id).await;
        settle("delete", id, result)
    }

    async fn delete_one(&mut self, id: &str) -> Result<bool> {
        let Some(attachment) = self.get_attachment(id).await? else {
            return Err(Error::NotFound(id.to_string()));
        };

        let hash = attachment.hash().map(str::to_string);
        let result = match &attachment {
            Attachment::Published { record, .. } => self.engine.delete_published(record).await,
            Attachment::Draft(draft) => self.engine.delete_draft(draft).await,
        };
        self.evict(id, hash.as_deref());
        result
    }

    /// Delete each id in order. The result is `true` only if every delete
    /// succeeded; earlier deletes are not undone.
    pub async fn delete_attachments(&mut self, ids: &[String]) -> Result<bool> {
        let mut all = true;
        for id in ids {
            all &= self.delete_attachment(id).await?;
        }
        Ok(all)
    }

    /// Upload intake: store `data` as draft `draft_id`.
    pub async fn stage_draft(
        &mut self,
        draft_id: &str,
        name: &str,
        data: &[u8],
        owner: Option<Component>,
    ) -> Result<DraftRecord> {
        let staged = self.engine.stage(draft_id, name, data, owner).await;
        self.evict(draft_id, None);
        staged
    }
}
