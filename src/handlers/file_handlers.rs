//! HTTP handlers for the upload protocol and file operations.

use crate::{
    auth::require_user,
    errors::AppError,
    services::file_service::{ConfirmUpload, NewUpload},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    pub validate: Option<String>,
}

impl ListFilesQuery {
    fn wants_validation(&self) -> bool {
        matches!(self.validate.as_deref(), Some("1") | Some("true"))
    }
}

/// POST `/projects/{projectId}/uploads` — issue a presigned upload slot.
/// No metadata is written; an unused slot simply expires.
pub async fn create_upload_slot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<NewUpload>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let slot = state
        .files
        .create_upload_slot(&user.sub, &project_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "upload": slot }))))
}

/// POST `/projects/{projectId}/uploads/{uploadId}/complete` — write the
/// metadata record for a finished client-direct upload.
pub async fn complete_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, upload_id)): Path<(String, String)>,
    Json(body): Json<ConfirmUpload>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let file = state
        .files
        .confirm_upload(&user.sub, &project_id, &upload_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "file": file }))))
}

/// GET `/projects/{projectId}/files` — list files; `?validate=1` also
/// reconciles records whose backing object is gone.
pub async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Query(query): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let validate = query.wants_validation();
    let listing = state.files.list(&user.sub, &project_id, validate).await?;

    let body = if validate {
        json!({ "files": listing.files, "reconciled": listing.reconciled })
    } else {
        json!({ "files": listing.files })
    };
    Ok(Json(body))
}

/// DELETE `/projects/{projectId}/files/{fileId}`.
pub async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    state.files.delete(&user.sub, &project_id, &file_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET `/projects/{projectId}/files/{fileId}/download` — presigned GET pair.
pub async fn download_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project_id, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let urls = state
        .files
        .download_urls(&user.sub, &project_id, &file_id)
        .await?;
    Ok(Json(urls))
}
