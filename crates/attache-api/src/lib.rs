//! HTTP surface for attachment upload, publish, delete and serving.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
///
/// Management endpoints live under `/api/v1`; byte serving is mounted at
/// `/{files,drafts,attachments}/:kind/:id/:name`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/drafts",
            get(handlers::attachments::list_drafts).post(handlers::attachments::upload_draft),
        )
        .route(
            "/api/v1/attachments",
            delete(handlers::attachments::delete_attachments),
        )
        .route(
            "/api/v1/attachments/publish",
            post(handlers::attachments::publish),
        )
        .route(
            "/api/v1/attachments/:id",
            delete(handlers::attachments::delete_attachment),
        )
        .route("/files/:kind/:id/:name", get(handlers::files::serve_any))
        .route("/drafts/:kind/:id/:name", get(handlers::files::serve_draft))
        .route(
            "/attachments/:kind/:id/:name",
            get(handlers::files::serve_published),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
