//! HTTP-facing error type.
//!
//! Service errors are converted here, once, into status codes and client
//! messages. Conditional-write outcomes arrive already mapped to domain
//! errors; anything infrastructural is logged with context and surfaced as a
//! generic server error so internals never leak to clients.

use crate::auth::AuthError;
use crate::services::file_service::FileError;
use crate::services::project_service::ProjectError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    fn server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server error")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        // 401 either way; clients get no signal about why the credential
        // failed beyond the short message.
        AppError::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

impl From<ProjectError> for AppError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::Validation(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            ProjectError::NotFound => AppError::not_found("project not found"),
            ProjectError::Conflict => AppError::new(StatusCode::CONFLICT, "project already exists"),
            ProjectError::Meta(inner) => {
                tracing::error!(error = %inner, "metadata store failure");
                AppError::server_error()
            }
        }
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Validation(msg) => AppError::new(StatusCode::BAD_REQUEST, msg),
            FileError::ProjectNotFound => AppError::not_found("project not found"),
            FileError::ProjectInactive => AppError::new(StatusCode::GONE, "project is not active"),
            FileError::NotFound => AppError::not_found("file not found"),
            FileError::Meta(inner) => {
                tracing::error!(error = %inner, "metadata store failure");
                AppError::server_error()
            }
            FileError::Object(inner) => {
                tracing::error!(error = %inner, "object store failure");
                AppError::server_error()
            }
        }
    }
}
