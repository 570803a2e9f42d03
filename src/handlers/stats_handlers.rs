//! Aggregate usage numbers for the signed-in owner.

use crate::{auth::require_user, errors::AppError, state::AppState};
use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};

/// GET `/me/stats`.
pub async fn owner_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&headers, state.identity.as_ref()).await?;
    let stats = state.projects.owner_stats(&user.sub).await?;
    Ok(Json(stats))
}
