//! Upload intake, publish and delete endpoints.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use attache_core::{Component, Slot};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/v1/drafts`: stage the multipart `file` field as a new draft.
///
/// Optional text fields `component_type` and `component_name` record the
/// intended owner.
pub async fn upload_draft(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut component_type: Option<String> = None;
    let mut component_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(|s| s.to_string());
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Failed to read file data: {}", e))
                        })?
                        .to_vec(),
                );
            }
            Some("component_type") => component_type = Some(text_field(field).await?),
            Some("component_name") => component_name = Some(text_field(field).await?),
            _ => {}
        }
    }

    let data = data.ok_or_else(|| {
        ApiError::BadRequest("No file uploaded. Use field name 'file'.".to_string())
    })?;
    let name = filename.unwrap_or_else(|| "upload".to_string());
    let owner = match (component_type, component_name) {
        (Some(t), Some(n)) => Some(Component::new(t, n)),
        _ => None,
    };

    let draft_id = Uuid::now_v7().to_string();
    let draft = state
        .engine
        .scope()
        .stage_draft(&draft_id, &name, &data, owner)
        .await?;

    info!(
        subsystem = "api",
        op = "upload",
        attachment_id = %draft.draft_id,
        byte_size = draft.byte_size,
        mime_type = %draft.mime_type,
        "Draft staged"
    );
    Ok((StatusCode::CREATED, Json(draft)))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub component_type: String,
    pub component_name: String,
}

/// `GET /api/v1/drafts?component_type=..&component_name=..`: pending drafts
/// staged for an owner.
pub async fn list_drafts(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = Component::new(query.component_type, query.component_name);
    let drafts = state.engine.pending_drafts(&owner).await?;
    Ok(Json(drafts))
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub attachment_id: Option<String>,
    pub attachment_ids: Option<Vec<String>>,
    pub component_type: String,
    pub component_name: String,
    pub position_type: String,
    /// String or number; stored as text.
    pub position_id: serde_json::Value,
    pub replace: Option<bool>,
}

impl PublishRequest {
    fn slot(&self) -> Slot {
        let position_id = match &self.position_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Slot::new(
            Component::new(&self.component_type, &self.component_name),
            &self.position_type,
            position_id,
        )
    }
}

/// `POST /api/v1/attachments/publish`.
///
/// `attachment_ids` publishes a batch (replacing the slot by default);
/// otherwise `attachment_id` publishes one (appending by default).
pub async fn publish(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = req.slot();
    let mut scope = state.engine.scope();

    let success = match &req.attachment_ids {
        Some(ids) => {
            scope
                .publish_many(ids, &slot, req.replace.unwrap_or(true))
                .await?
        }
        None => {
            scope
                .publish(
                    req.attachment_id.as_deref(),
                    &slot,
                    req.replace.unwrap_or(false),
                )
                .await?
        }
    };

    Ok(Json(serde_json::json!({ "success": success })))
}

/// `DELETE /api/v1/attachments/:id`.
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let success = state.engine.scope().delete_attachment(&id).await?;
    Ok(Json(serde_json::json!({ "success": success })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteManyRequest {
    pub attachment_ids: Vec<String>,
}

/// `DELETE /api/v1/attachments` with a JSON body of ids.
pub async fn delete_attachments(
    State(state): State<AppState>,
    Json(req): Json<DeleteManyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let success = state
        .engine
        .scope()
        .delete_attachments(&req.attachment_ids)
        .await?;
    Ok(Json(serde_json::json!({ "success": success })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_position_id() {
        let req: PublishRequest = serde_json::from_value(serde_json::json!({
            "attachment_id": "d1",
            "component_type": "module",
            "component_name": "board",
            "position_type": "post",
            "position_id": 42
        }))
        .unwrap();
        let slot = req.slot();
        assert_eq!(slot.position_id, "42");
        assert_eq!(slot.component.component_name, "board");
        assert!(req.replace.is_none());
    }
}
