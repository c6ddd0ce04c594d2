//! Byte serving for drafts and published attachments.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use tracing::debug;

use attache_core::ServeKind;
use attache_lifecycle::ServeHeaders;

use crate::error::ApiError;
use crate::state::AppState;

/// Which attachment states a route prefix may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeScope {
    /// Drafts and published attachments.
    Files,
    Drafts,
    Attachments,
}

impl ServeScope {
    pub fn admits(self, is_published: bool) -> bool {
        match self {
            Self::Files => true,
            Self::Drafts => !is_published,
            Self::Attachments => is_published,
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(attache_core::Error::Internal(e.to_string())))
}

/// `GET /files/:kind/:id/:name`: drafts and published attachments.
pub async fn serve_any(
    state: State<AppState>,
    path: Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    serve_file(ServeScope::Files, state, path).await
}

/// `GET /drafts/:kind/:id/:name`.
pub async fn serve_draft(
    state: State<AppState>,
    path: Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    serve_file(ServeScope::Drafts, state, path).await
}

/// `GET /attachments/:kind/:id/:name`.
pub async fn serve_published(
    state: State<AppState>,
    path: Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    serve_file(ServeScope::Attachments, state, path).await
}

/// The trailing name segment is the file name offered for downloads.
async fn serve_file(
    scope: ServeScope,
    State(state): State<AppState>,
    Path((kind, id, name)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: ServeKind = kind.parse().map_err(ApiError::BadRequest)?;

    let mut request = state.engine.scope();
    let resolved = request.resolve_for(&id, kind).await?;
    if !scope.admits(resolved.is_published) {
        debug!(
            subsystem = "api",
            attachment_id = %id,
            is_published = resolved.is_published,
            "Identifier outside route scope"
        );
        return Err(ApiError::NotFound(id));
    }

    let bytes = match tokio::fs::read(&resolved.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(id));
        }
        Err(e) => return Err(attache_core::Error::Io(e).into()),
    };

    let serve = ServeHeaders::for_kind(kind, &resolved, &name, state.cache_max_age_secs());
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(&serve.content_type)?);
    headers.insert(header::CACHE_CONTROL, header_value(&serve.cache_control)?);
    if let Some(disposition) = &serve.content_disposition {
        headers.insert(header::CONTENT_DISPOSITION, header_value(disposition)?);
    }

    Ok((StatusCode::OK, headers, bytes))
}
