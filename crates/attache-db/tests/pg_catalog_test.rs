//! PostgreSQL catalog integration tests.
//!
//! Run with: `cargo test -p attache-db -- --ignored`

use attache_db::test_fixtures::connect_test_database;
use attache_db::{
    AttachmentRecord, AttachmentStore, Catalog, CatalogTx, Component, ContentStore, DraftRecord,
    DraftStore, Error, FileRecord, MediaType, PgCatalog, Slot,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

async fn catalog() -> PgCatalog {
    dotenvy::dotenv().ok();
    connect_test_database()
        .await
        .expect("Failed to connect to test database")
        .catalog()
}

fn unique_hash() -> String {
    Uuid::new_v4().simple().to_string()
}

fn file(hash: &str) -> FileRecord {
    FileRecord {
        hash: hash.to_string(),
        storage_path: format!("files/{}/{}/{}.test", &hash[0..1], &hash[1..2], hash),
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
        display_name: "notes.txt".to_string(),
        created_at: Utc::now(),
    }
}

fn unique_slot() -> Slot {
    Slot::new(
        Component::new("module", format!("board_{}", Uuid::new_v4().simple())),
        "post",
        1,
    )
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_create_file_duplicate_hash() {
    let catalog = catalog().await;
    let hash = unique_hash();

    let mut tx = catalog.begin().await.unwrap();
    tx.create_file(&file(&hash)).await.unwrap();
    let err = tx.create_file(&file(&hash)).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateHash(_)));
    tx.rollback().await.unwrap();

    assert!(catalog.find_file(&hash).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_attachment_round_trip_and_reference_count() {
    let catalog = catalog().await;
    let hash = unique_hash();
    let slot = unique_slot();
    let a1 = Uuid::new_v4().to_string();
    let a2 = Uuid::new_v4().to_string();

    let mut tx = catalog.begin().await.unwrap();
    tx.create_file(&file(&hash)).await.unwrap();
    tx.insert_attachment(&attachment(&a1, &hash, &slot))
        .await
        .unwrap();
    tx.insert_attachment(&attachment(&a2, &hash, &slot))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let found = catalog.find_attachment(&a1).await.unwrap().unwrap();
    assert!(found.is_published());
    assert_eq!(found.hash(), Some(hash.as_str()));
    assert_eq!(found.slot(), Some(&slot));

    let members = catalog.slot_members(&slot, &[a1.clone()]).await.unwrap();
    assert_eq!(members, vec![a2.clone()]);

    let mut tx = catalog.begin().await.unwrap();
    assert!(tx.lock_file(&hash).await.unwrap().is_some());
    assert!(tx.delete_attachment(&a1).await.unwrap());
    assert_eq!(tx.reference_count(&hash).await.unwrap(), 1);
    assert!(tx.delete_attachment(&a2).await.unwrap());
    assert_eq!(tx.reference_count(&hash).await.unwrap(), 0);
    assert!(tx.delete_file(&hash).await.unwrap());
    tx.commit().await.unwrap();

    assert!(catalog.find_attachment(&a1).await.unwrap().is_none());
    assert!(catalog.find_file(&hash).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_draft_upsert_and_expiry() {
    let catalog = catalog().await;
    let draft_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let mut draft = DraftRecord {
        draft_id: draft_id.clone(),
        storage_path: format!("drafts/{}", draft_id),
        name: "photo.png".to_string(),
        hash: Some(format!("d{}", draft_id.replace('-', ""))),
        media_type: MediaType::Image,
        mime_type: "image/png".to_string(),
        extension: "png".to_string(),
        byte_size: 10,
        width: 3,
        height: 2,
        owner: Some(Component::new("module", "gallery")),
        created_at: now,
        expires_at: Some(now + Duration::hours(1)),
    };

    let mut tx = catalog.begin().await.unwrap();
    tx.put_draft(&draft).await.unwrap();
    draft.expires_at = Some(now - Duration::hours(1));
    tx.put_draft(&draft).await.unwrap();
    tx.commit().await.unwrap();

    let expired = catalog.expired_drafts(now).await.unwrap();
    assert!(expired.iter().any(|d| d.draft_id == draft_id));

    let found = catalog.find_attachment(&draft_id).await.unwrap().unwrap();
    assert!(!found.is_published());
    assert_eq!(found.width(), 3);

    let mut tx = catalog.begin().await.unwrap();
    assert!(tx.draft_exists_at(&draft.storage_path).await.unwrap());
    let hash = draft.hash.clone().unwrap();
    assert!(tx.draft_hash_exists(&hash).await.unwrap());
    assert!(tx.delete_draft(&draft_id).await.unwrap());
    assert!(!tx.draft_hash_exists(&hash).await.unwrap());
    tx.commit().await.unwrap();
}
