//! PostgreSQL catalog.
//!
//! Each [`PgCatalogTx`] wraps one sqlx transaction. Publish lookups take a
//! `FOR SHARE` lock on the file row and the delete path takes `FOR UPDATE`,
//! so a delete and a dedup hit on the same hash serialize on that row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use attache_core::{
    AttachmentRecord, AttachmentStore, Catalog, CatalogTx, Component, ContentStore, DraftRecord,
    DraftStore, Error, FileRecord, Result, Slot,
};

const FILE_COLUMNS: &str = "hash, storage_path, media_type, mime_type, extension, \
     byte_size, width, height, created_at";

const DRAFT_COLUMNS: &str = "draft_id, storage_path, name, hash, media_type, mime_type, \
     extension, byte_size, width, height, component_type, component_name, created_at, expires_at";

const ATTACHMENT_COLUMNS: &str = "attachment_id, hash, component_type, component_name, \
     position_type, position_id, display_name, created_at";

/// Catalog backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTx { tx }))
    }
}

/// One open PostgreSQL transaction. Dropping it rolls back.
pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

impl PgCatalogTx {
    async fn fetch_file(&mut self, hash: &str, lock: &str) -> Result<Option<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM attachment_file WHERE hash = $1 {}",
            FILE_COLUMNS, lock
        );
        let row = sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(file_from_row))
    }
}

#[async_trait]
impl ContentStore for PgCatalogTx {
    async fn lookup_file(&mut self, hash: &str) -> Result<Option<FileRecord>> {
        self.fetch_file(hash, "FOR SHARE").await
    }

    async fn lock_file(&mut self, hash: &str) -> Result<Option<FileRecord>> {
        self.fetch_file(hash, "FOR UPDATE").await
    }

    async fn create_file(&mut self, record: &FileRecord) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO attachment_file
               (hash, storage_path, media_type, mime_type, extension,
                byte_size, width, height, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (hash) DO NOTHING"#,
        )
        .bind(&record.hash)
        .bind(&record.storage_path)
        .bind(record.media_type.to_string())
        .bind(&record.mime_type)
        .bind(&record.extension)
        .bind(record.byte_size)
        .bind(record.width)
        .bind(record.height)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                subsystem = "catalog",
                component = "pg",
                hash = %record.hash,
                "File record already exists"
            );
            return Err(Error::DuplicateHash(record.hash.clone()));
        }
        Ok(())
    }

    async fn reference_count(&mut self, hash: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachment WHERE hash = $1")
            .bind(hash)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn delete_file(&mut self, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM attachment_file WHERE hash = $1")
            .bind(hash)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn file_exists_at(&mut self, storage_path: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM attachment_file WHERE storage_path = $1)",
        )
        .bind(storage_path)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl DraftStore for PgCatalogTx {
    async fn get_draft(&mut self, draft_id: &str) -> Result<Option<DraftRecord>> {
        let sql = format!(
            "SELECT {} FROM attachment_draft WHERE draft_id = $1",
            DRAFT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(draft_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(draft_from_row))
    }

    async fn put_draft(&mut self, record: &DraftRecord) -> Result<()> {
        let (component_type, component_name) = match &record.owner {
            Some(owner) => (
                Some(owner.component_type.as_str()),
                Some(owner.component_name.as_str()),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"INSERT INTO attachment_draft
               (draft_id, storage_path, name, hash, media_type, mime_type, extension,
                byte_size, width, height, component_type, component_name,
                created_at, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               ON CONFLICT (draft_id) DO UPDATE SET
                   storage_path = EXCLUDED.storage_path,
                   name = EXCLUDED.name,
                   hash = EXCLUDED.hash,
                   media_type = EXCLUDED.media_type,
                   mime_type = EXCLUDED.mime_type,
                   extension = EXCLUDED.extension,
                   byte_size = EXCLUDED.byte_size,
                   width = EXCLUDED.width,
                   height = EXCLUDED.height,
                   component_type = EXCLUDED.component_type,
                   component_name = EXCLUDED.component_name,
                   created_at = EXCLUDED.created_at,
                   expires_at = EXCLUDED.expires_at"#,
        )
        .bind(&record.draft_id)
        .bind(&record.storage_path)
        .bind(&record.name)
        .bind(&record.hash)
        .bind(record.media_type.to_string())
        .bind(&record.mime_type)
        .bind(&record.extension)
        .bind(record.byte_size)
        .bind(record.width)
        .bind(record.height)
        .bind(component_type)
        .bind(component_name)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_draft(&mut self, draft_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM attachment_draft WHERE draft_id = $1")
            .bind(draft_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_drafts_by_owner(&mut self, owner: &Component) -> Result<Vec<DraftRecord>> {
        let sql = format!(
            "SELECT {} FROM attachment_draft \
             WHERE component_type = $1 AND component_name = $2 \
             ORDER BY created_at, draft_id",
            DRAFT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&owner.component_type)
            .bind(&owner.component_name)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(draft_from_row).collect())
    }

    async fn list_expired_drafts(&mut self, now: DateTime<Utc>) -> Result<Vec<DraftRecord>> {
        let sql = format!(
            "SELECT {} FROM attachment_draft \
             WHERE expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at, draft_id",
            DRAFT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(draft_from_row).collect())
    }

    async fn draft_exists_at(&mut self, storage_path: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM attachment_draft WHERE storage_path = $1)",
        )
        .bind(storage_path)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn draft_hash_exists(&mut self, hash: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM attachment_draft WHERE hash = $1)")
                .bind(hash)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl AttachmentStore for PgCatalogTx {
    async fn get_attachment(&mut self, attachment_id: &str) -> Result<Option<AttachmentRecord>> {
        let sql = format!(
            "SELECT {} FROM attachment WHERE attachment_id = $1",
            ATTACHMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(attachment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(attachment_from_row))
    }

    async fn insert_attachment(&mut self, record: &AttachmentRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO attachment
               (attachment_id, hash, component_type, component_name,
                position_type, position_id, display_name, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(&record.attachment_id)
        .bind(&record.hash)
        .bind(&record.slot.component.component_type)
        .bind(&record.slot.component.component_name)
        .bind(&record.slot.position_type)
        .bind(&record.slot.position_id)
        .bind(&record.display_name)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_attachment_slot(&mut self, attachment_id: &str, slot: &Slot) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET component_type = $2, component_name = $3,
                   position_type = $4, position_id = $5
               WHERE attachment_id = $1"#,
        )
        .bind(attachment_id)
        .bind(&slot.component.component_type)
        .bind(&slot.component.component_name)
        .bind(&slot.position_type)
        .bind(&slot.position_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_attachment(&mut self, attachment_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM attachment WHERE attachment_id = $1")
            .bind(attachment_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_slot(&mut self, slot: &Slot, except: &[String]) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT attachment_id FROM attachment
               WHERE component_type = $1 AND component_name = $2
                 AND position_type = $3 AND position_id = $4
                 AND attachment_id <> ALL($5)
               ORDER BY created_at, attachment_id"#,
        )
        .bind(&slot.component.component_type)
        .bind(&slot.component.component_name)
        .bind(&slot.position_type)
        .bind(&slot.position_id)
        .bind(except.to_vec())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn file_from_row(row: &PgRow) -> FileRecord {
    FileRecord {
        hash: row.get("hash"),
        storage_path: row.get("storage_path"),
        media_type: row
            .get::<String, _>("media_type")
            .parse()
            .unwrap_or_default(),
        mime_type: row.get("mime_type"),
        extension: row.get("extension"),
        byte_size: row.get("byte_size"),
        width: row.get("width"),
        height: row.get("height"),
        created_at: row.get("created_at"),
    }
}

fn draft_from_row(row: &PgRow) -> DraftRecord {
    let owner = match (
        row.get::<Option<String>, _>("component_type"),
        row.get::<Option<String>, _>("component_name"),
    ) {
        (Some(component_type), Some(component_name)) => {
            Some(Component::new(component_type, component_name))
        }
        _ => None,
    };

    DraftRecord {
        draft_id: row.get("draft_id"),
        storage_path: row.get("storage_path"),
        name: row.get("name"),
        hash: row.get("hash"),
        media_type: row
            .get::<String, _>("media_type")
            .parse()
            .unwrap_or_default(),
        mime_type: row.get("mime_type"),
        extension: row.get("extension"),
        byte_size: row.get("byte_size"),
        width: row.get("width"),
        height: row.get("height"),
        owner,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn attachment_from_row(row: &PgRow) -> AttachmentRecord {
    AttachmentRecord {
        attachment_id: row.get("attachment_id"),
        hash: row.get("hash"),
        slot: Slot::new(
            Component::new(
                row.get::<String, _>("component_type"),
                row.get::<String, _>("component_name"),
            ),
            row.get::<String, _>("position_type"),
            row.get::<String, _>("position_id"),
        ),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}
