//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes both backing stores

use crate::services::metadata_store::QueryOptions;
use crate::services::object_store::ObjectExistence;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a cheap bounded query against the metadata store.
/// 2. Head-checks a probe key against the object store; "present" and
///    "absent" both mean reachable, only an inconclusive answer fails.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let metadata_check = match state
        .meta
        .query_by_prefix(
            "READYZ#probe",
            "NONE#",
            QueryOptions {
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
    {
        Ok(_) => (true, None::<String>),
        Err(err) => (false, Some(format!("error: {err}"))),
    };

    let object_check = match state
        .objects
        .head(state.files.bucket(), ".readyz-probe")
        .await
    {
        ObjectExistence::Present | ObjectExistence::Absent => (true, None::<String>),
        ObjectExistence::Unknown => (false, Some("head check inconclusive".to_string())),
    };

    let metadata_ok = metadata_check.0;
    let object_ok = object_check.0;
    let overall_ok = metadata_ok && object_ok;

    let mut checks = HashMap::new();
    checks.insert(
        "metadata",
        CheckStatus {
            ok: metadata_ok,
            error: metadata_check.1,
        },
    );
    checks.insert(
        "object_store",
        CheckStatus {
            ok: object_ok,
            error: object_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
