use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::context::ConversionError;
use crate::session::SessionUnavailable;

/// Failures a handler reports to the client
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Unavailable(#[from] SessionUnavailable),

    #[error(transparent)]
    Rejected(#[from] ConversionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Rejected(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "msg": message })),
            )
                .into_response(),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
