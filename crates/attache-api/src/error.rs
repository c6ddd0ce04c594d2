//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    Internal(attache_core::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<attache_core::Error> for ApiError {
    fn from(err: attache_core::Error) -> Self {
        match &err {
            attache_core::Error::NotFound(msg) | attache_core::Error::NotFoundFile(msg) => {
                ApiError::NotFound(msg.clone())
            }
            attache_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                attache_core::Error::NotFoundFile("d1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                attache_core::Error::NotFound("d1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                attache_core::Error::InvalidInput("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                attache_core::Error::NotWritable("/srv".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
