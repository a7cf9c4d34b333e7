//! The HTTP-facing error type.
//!
//! Every handler returns `ApiResult<T>`. Lower layers keep their own error enums
//! (`RepositoryError`, `MediaError`, `PasswordError`, `TokenError`) and convert into
//! `ApiError` at the handler boundary, where the status code and the JSON body
//! `{ "error": <label>, "details"?: <detail> }` are decided.

use axum::{
    Json,
    extract::rejection::PathRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::TokenError, media::MediaError, password::PasswordError, repository::RepositoryError,
};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid input (400).
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid, or expired bearer token (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but lacking the required role (403).
    #[error("{0}")]
    Forbidden(String),

    /// Absent, or not visible to the caller (404).
    #[error("{0}")]
    NotFound(String),

    /// The media host rejected an upload that was part of a write (400).
    #[error("file upload failed: {0}")]
    Upload(#[source] MediaError),

    /// The media host could not serve a stored attachment (500).
    #[error("file retrieval failed: {0}")]
    Retrieval(#[source] MediaError),

    /// Anything unexpected (500). The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// ErrorBody
///
/// The JSON shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Retrieval(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            ApiError::Validation(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => ErrorBody {
                error: msg,
                details: None,
            },
            ApiError::Upload(cause) => ErrorBody {
                error: "File upload failed".to_string(),
                details: Some(cause.to_string()),
            },
            ApiError::Retrieval(cause) => {
                tracing::error!(error = %cause, "failed to retrieve attachment");
                ErrorBody {
                    error: "Failed to retrieve file".to_string(),
                    details: None,
                }
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ErrorBody {
                    error: "Internal server error".to_string(),
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateEmail => {
                ApiError::Validation("Email already exists".to_string())
            }
            RepositoryError::Database(e) => ApiError::Internal(format!("database error: {}", e)),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected path parameter");
        ApiError::Validation("Invalid id".to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(format!("password operation failed: {}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => ApiError::Internal(format!("token signing failed: {}", msg)),
            TokenError::Expired | TokenError::Invalid(_) => {
                ApiError::Unauthorized("Invalid or expired token.".to_string())
            }
        }
    }
}
