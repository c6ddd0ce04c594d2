//! Router tests against the in-memory catalog and a temp storage root.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use attache_api::{router, AppState};
use attache_core::StorageConfig;
use attache_db::MemoryCatalog;
use attache_lifecycle::LifecycleEngine;

const BOUNDARY: &str = "attache-test-boundary";

struct TestApp {
    _dir: TempDir,
    app: Router,
    catalog: MemoryCatalog,
}

fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let catalog = MemoryCatalog::new();
    let config = StorageConfig::default().with_root(dir.path());
    let engine = LifecycleEngine::new(Arc::new(catalog.clone()), config);
    TestApp {
        _dir: dir,
        app: router(AppState::new(engine), 1024 * 1024),
        catalog,
    }
}

fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"component_type\"\r\n\r\nmodule\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"component_name\"\r\n\r\nboard\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

async fn upload(app: &Router, filename: &str, data: &[u8]) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/drafts")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, data)))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    serde_json::from_slice(&body).unwrap()
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn publish_payload(id: &str) -> Value {
    json!({
        "attachment_id": id,
        "component_type": "module",
        "component_name": "board",
        "position_type": "post",
        "position_id": 7
    })
}

#[tokio::test]
async fn test_health() {
    let t = test_app();
    let (status, _, body) = send(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_upload_publish_and_serve() {
    let t = test_app();
    let draft = upload(&t.app, "Notes.TXT", b"hello world").await;
    let id = draft["draft_id"].as_str().unwrap().to_string();
    assert_eq!(draft["name"], "Notes.TXT");
    assert_eq!(draft["byte_size"], 11);
    assert_eq!(draft["owner"]["component_name"], "board");

    // Drafts are served under /drafts and /files, not /attachments.
    let (status, headers, body) = send(&t.app, get(&format!("/drafts/origin/{id}/n.txt"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello world");
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let (status, _, _) = send(&t.app, get(&format!("/attachments/origin/{id}/n.txt"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_json(&t.app, "/api/v1/attachments/publish", publish_payload(&id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let state = t.catalog.snapshot().await;
    assert!(state.drafts.is_empty());
    assert_eq!(state.attachments[&id].slot.position_id, "7");

    let (status, headers, body) =
        send(&t.app, get(&format!("/attachments/origin/{id}/n.txt"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello world");
    assert_eq!(headers[header::CACHE_CONTROL], "max-age=3600");
    assert!(headers.get(header::CONTENT_DISPOSITION).is_none());

    let (status, _, _) = send(&t.app, get(&format!("/drafts/origin/{id}/n.txt"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&t.app, get(&format!("/files/view/{id}/n.txt"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_pending_drafts_by_owner() {
    let t = test_app();
    let draft = upload(&t.app, "a.txt", b"pending").await;
    let id = draft["draft_id"].as_str().unwrap().to_string();

    let uri = "/api/v1/drafts?component_type=module&component_name=board";
    let (status, _, body) = send(&t.app, get(uri)).await;
    assert_eq!(status, StatusCode::OK);
    let listed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["draft_id"], id.as_str());

    post_json(&t.app, "/api/v1/attachments/publish", publish_payload(&id)).await;
    let (_, _, body) = send(&t.app, get(uri)).await;
    let listed: Value = serde_json::from_slice(&body).unwrap();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_download_sets_disposition() {
    let t = test_app();
    let draft = upload(&t.app, "my report.txt", b"quarterly").await;
    let id = draft["draft_id"].as_str().unwrap();

    let uri = format!("/files/download/{id}/client%20copy.txt");
    let (status, headers, _) = send(&t.app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''client%20copy.txt"
    );
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let t = test_app();
    let (status, _, body) = send(&t.app, get("/files/origin/missing/x.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_invalid_kind_is_bad_request() {
    let t = test_app();
    let (status, _, _) = send(&t.app, get("/files/preview/anything/x.png")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_publish_unknown_id_reports_failure() {
    let t = test_app();
    let (status, body) =
        post_json(&t.app, "/api/v1/attachments/publish", publish_payload("ghost")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_publish_many_replaces_slot() {
    let t = test_app();
    let first = upload(&t.app, "a.txt", b"first").await;
    let first_id = first["draft_id"].as_str().unwrap().to_string();
    let (_, body) = post_json(
        &t.app,
        "/api/v1/attachments/publish",
        publish_payload(&first_id),
    )
    .await;
    assert_eq!(body["success"], true);

    let second = upload(&t.app, "b.txt", b"second").await;
    let second_id = second["draft_id"].as_str().unwrap().to_string();
    let mut payload = publish_payload(&second_id);
    payload["attachment_ids"] = json!([second_id]);
    let (_, body) = post_json(&t.app, "/api/v1/attachments/publish", payload).await;
    assert_eq!(body["success"], true);

    let state = t.catalog.snapshot().await;
    assert_eq!(state.attachments.len(), 1);
    assert!(state.attachments.contains_key(&second_id));
    assert_eq!(state.files.len(), 1);
}

#[tokio::test]
async fn test_delete_attachment() {
    let t = test_app();
    let draft = upload(&t.app, "a.txt", b"gone soon").await;
    let id = draft["draft_id"].as_str().unwrap().to_string();
    post_json(&t.app, "/api/v1/attachments/publish", publish_payload(&id)).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/attachments/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], true);

    let state = t.catalog.snapshot().await;
    assert!(state.attachments.is_empty());
    assert!(state.files.is_empty());

    let (status, _, _) = send(&t.app, get(&format!("/files/origin/{id}/a.txt"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_many_reports_partial_failure() {
    let t = test_app();
    let draft = upload(&t.app, "a.txt", b"draft bytes").await;
    let id = draft["draft_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/attachments")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "attachment_ids": [id, "ghost"] }).to_string(),
        ))
        .unwrap();
    let (status, _, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);
    assert!(t.catalog.snapshot().await.drafts.is_empty());
}
