//! Defines routes for all project and file operations.
//!
//! ## Structure
//! - **Project endpoints**
//!   - `POST   /projects` — create project
//!   - `GET    /projects` — list projects, newest first
//!   - `GET    /projects/{projectId}` — fetch one project
//!   - `PATCH  /projects/{projectId}` — rename
//!   - `DELETE /projects/{projectId}` — delete project + cascade files
//!
//! - **Upload / file endpoints**
//!   - `POST   /projects/{projectId}/uploads` — issue presigned upload slot
//!   - `POST   /projects/{projectId}/uploads/{uploadId}/complete` — confirm
//!   - `GET    /projects/{projectId}/files` — list (`?validate=1` reconciles)
//!   - `DELETE /projects/{projectId}/files/{fileId}` — delete one file
//!   - `GET    /projects/{projectId}/files/{fileId}/download` — presigned GETs
//!
//! Authentication happens inside each handler via the identity gate; there
//! is no route that touches metadata without a verified subject.

use crate::{
    handlers::{
        file_handlers::{
            complete_upload, create_upload_slot, delete_file, download_file, list_files,
        },
        health_handlers::{healthz, readyz},
        project_handlers::{
            create_project, delete_project, get_project, list_projects, rename_project,
        },
        stats_handlers::owner_stats,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state ([`AppState`]) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // owner-level endpoints
        .route("/me/stats", get(owner_stats))
        // project endpoints
        .route("/projects", post(create_project).get(list_projects))
        .route(
            "/projects/{projectId}",
            get(get_project)
                .patch(rename_project)
                .delete(delete_project),
        )
        // upload protocol
        .route("/projects/{projectId}/uploads", post(create_upload_slot))
        .route(
            "/projects/{projectId}/uploads/{uploadId}/complete",
            post(complete_upload),
        )
        // file endpoints
        .route("/projects/{projectId}/files", get(list_files))
        .route(
            "/projects/{projectId}/files/{fileId}",
            axum::routing::delete(delete_file),
        )
        .route(
            "/projects/{projectId}/files/{fileId}/download",
            get(download_file),
        )
}
