use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    auth::AuthError, models::ErrorBody, repository::RepositoryError, storage::StorageError,
};

/// ApiError
///
/// Every failure a handler can surface. Non-auth errors are returned verbatim to the initiating
/// screen as `{ message }`; internal causes are logged and replaced by a generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    /// Unreadable form body. Keeps axum's status, e.g. 413 once the body limit is hit.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error("Record not found")]
    NotFound,

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Invalid username or password")]
    InvalidLogin,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(err) => err.status(),
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(err) => err.status(),
            ApiError::NotFound | ApiError::UnknownCollection(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InvalidLogin => StatusCode::UNAUTHORIZED,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Repository(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Auth(err) => return (*err).into_response(),
            ApiError::Multipart(err) => ErrorBody::new(err.body_text()),
            ApiError::Storage(err) => {
                tracing::error!(error = %err, "media host failure");
                ErrorBody::new("Media upload failed")
            }
            ApiError::Repository(err) => {
                tracing::error!(error = %err, "repository failure");
                ErrorBody::new("Database error")
            }
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                ErrorBody::new("Internal server error")
            }
            other => ErrorBody::new(other.to_string()),
        };

        (self.status(), Json(body)).into_response()
    }
}
