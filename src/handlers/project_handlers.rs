//! HTTP handlers for project operations.

use crate::{auth::require_user, errors::AppError, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

/// Body for create and rename. `name` is optional on the wire so a missing
/// field reads as a 400 from validation, not a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectNameBody {
    #[serde(default)]
    pub name: Option<String>,
}

/// POST `/projects` — create a project.
pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProjectNameBody>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let project = state
        .projects
        .create(&user.sub, body.name.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "project": project }))))
}

/// GET `/projects` — list the caller's projects, newest first.
pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let projects = state.projects.list(&user.sub).await?;
    Ok(Json(json!({ "projects": projects })))
}

/// GET `/projects/{projectId}` — fetch one project.
pub async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let located = state
        .projects
        .find_by_id(&user.sub, &project_id)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;
    Ok(Json(json!({ "project": located.project })))
}

/// PATCH `/projects/{projectId}` — rename.
pub async fn rename_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<ProjectNameBody>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let project = state
        .projects
        .rename(
            &user.sub,
            &project_id,
            body.name.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(json!({ "project": project })))
}

/// DELETE `/projects/{projectId}` — delete the project and everything in it.
///
/// Sequencing matters: locate first, cascade the files, then conditionally
/// delete the project row last so a concurrent delete resolves to 404 on one
/// side instead of leaving files behind.
pub async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let located = state
        .projects
        .find_by_id(&user.sub, &project_id)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    let cascade = state
        .files
        .delete_all_for_project(&user.sub, &project_id)
        .await?;
    state.projects.delete_located(&located.pk, &located.sk).await?;

    Ok(Json(json!({
        "ok": true,
        "projectId": project_id,
        "deletedFileRows": cascade.deleted_file_rows,
        "deletedObjects": cascade.deleted_objects,
    })))
}
