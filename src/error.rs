use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use crate::upload::UploadError;
use crate::webhook::WebhookRejection;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{error}: {message}")]
    Unauthorized { error: String, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Chunk already uploaded")]
    ChunkConflict { next_chunk: u32 },

    #[error("Failed to send webhook: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(error: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Unauthorized {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized { error, message } => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": error, "message": message }),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::ChunkConflict { next_chunk } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "nextChunk": next_chunk }),
            ),
            AppError::Upstream(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": true,
                    "message": msg,
                    "hint": "Failed to send webhook. Check if the URL is valid."
                }),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Something went wrong!", "message": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::DuplicateChunk { next_chunk } => AppError::ChunkConflict { next_chunk },
            UploadError::NotFound | UploadError::NotProcessed => AppError::NotFound(err.to_string()),
            UploadError::MissingFields
            | UploadError::InvalidChunking(_)
            | UploadError::ChunkOutOfRange { .. } => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<WebhookRejection> for AppError {
    fn from(err: WebhookRejection) -> Self {
        match err {
            WebhookRejection::MissingSignature => {
                AppError::unauthorized("Missing webhook signature", err.to_string())
            }
            WebhookRejection::InvalidSignature => {
                AppError::unauthorized("Invalid signature", err.to_string())
            }
            WebhookRejection::MissingId => AppError::BadRequest(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::unauthorized("a", "b"), StatusCode::UNAUTHORIZED),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::ChunkConflict { next_chunk: 2 }, StatusCode::CONFLICT),
            (AppError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn domain_errors_convert() {
        let conflict: AppError = UploadError::DuplicateChunk { next_chunk: 3 }.into();
        assert!(matches!(conflict, AppError::ChunkConflict { next_chunk: 3 }));

        let missing: AppError = UploadError::NotProcessed.into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let bad_sig: AppError = WebhookRejection::InvalidSignature.into();
        assert_eq!(bad_sig.into_response().status(), StatusCode::UNAUTHORIZED);

        let no_id: AppError = WebhookRejection::MissingId.into();
        assert_eq!(no_id.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
