//! End-to-end tests over the HTTP surface: real router, real HS256 tokens,
//! in-memory stores standing in for the document and object stores.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use filedeck::auth::{Hs256Gate, IdentityGate};
use filedeck::routes::routes::routes;
use filedeck::services::file_service::FileService;
use filedeck::services::metadata_store::{MemoryMetadataStore, MetadataStore};
use filedeck::services::object_store::{MemoryObjectStore, ObjectStore};
use filedeck::services::project_service::ProjectService;
use filedeck::state::AppState;
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

#[derive(Serialize)]
struct TestClaims<'a> {
    sub: &'a str,
    exp: u64,
}

fn token(sub: &str) -> String {
    encode(
        &Header::default(),
        &TestClaims {
            sub,
            exp: 4_102_444_800,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn app() -> (Router, Arc<MemoryObjectStore>) {
    let store = Arc::new(MemoryMetadataStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let meta: Arc<dyn MetadataStore> = store;
    let objects_dyn: Arc<dyn ObjectStore> = objects.clone();
    let identity: Arc<dyn IdentityGate> = Arc::new(Hs256Gate::new(SECRET));

    let projects = ProjectService::new(meta.clone());
    let files = FileService::new(
        meta.clone(),
        objects_dyn.clone(),
        projects.clone(),
        "raw-bucket",
        Duration::from_secs(300),
        Duration::from_secs(60),
    );

    let state = AppState {
        identity,
        projects,
        files,
        meta,
        objects: objects_dyn,
    };
    (routes().with_state(state), objects)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = auth {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn requests_without_a_credential_are_401() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = send(&app, Method::GET, "/projects", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn project_create_validates_the_name() {
    let (app, _) = app();
    let jwt = token("owner-1");

    let (status, _) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "x".repeat(81) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_rename_list_round_trip() {
    let (app, _) = app();
    let jwt = token("owner-1");

    let (status, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Tax Docs" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();
    assert_eq!(body["project"]["status"], "active");

    tokio::time::sleep(Duration::from_millis(5)).await;
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/projects/{project_id}"),
        Some(&jwt),
        Some(json!({ "name": "Tax Docs 2026" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["name"], "Tax Docs 2026");

    let (status, body) = send(&app, Method::GET, "/projects", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    let projects = body["projects"].as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Tax Docs 2026");
    assert!(
        projects[0]["updatedAt"].as_str().unwrap() > projects[0]["createdAt"].as_str().unwrap()
    );
}

#[tokio::test]
async fn projects_are_invisible_across_owners() {
    let (app, _) = app();
    let mine = token("owner-a");
    let theirs = token("owner-b");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&mine),
        Some(json!({ "name": "private" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}"),
        Some(&theirs),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_slot_then_confirm_then_list() {
    let (app, objects) = app();
    let jwt = token("owner-1");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Receipts" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/projects/{project_id}/uploads"),
        Some(&jwt),
        Some(json!({
            "filename": "invoice.pdf",
            "contentType": "application/pdf",
            "sizeBytes": 1024,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let upload = &body["upload"];
    let upload_id = upload["uploadId"].as_str().unwrap().to_string();
    let bucket = upload["bucket"].as_str().unwrap().to_string();
    let object_key = upload["objectKey"].as_str().unwrap().to_string();
    assert!(upload["putUrl"].as_str().unwrap().starts_with("https://"));
    assert_eq!(upload["headers"]["Content-Type"], "application/pdf");

    // The client PUTs directly against the presigned URL.
    objects.put_object(&bucket, &object_key);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/projects/{project_id}/uploads/{upload_id}/complete"),
        Some(&jwt),
        Some(json!({
            "filename": "invoice.pdf",
            "contentType": "application/pdf",
            "sizeBytes": 1024,
            "bucket": bucket,
            "objectKey": object_key,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["file"]["status"], "queued");
    assert_eq!(body["file"]["sizeBytes"], 1024);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/files"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["filename"], "invoice.pdf");
    assert!(body.get("reconciled").is_none());
}

#[tokio::test]
async fn upload_slot_for_a_missing_project_is_404() {
    let (app, _) = app();
    let jwt = token("owner-1");
    let (status, _) = send(
        &app,
        Method::POST,
        "/projects/no-such-project/uploads",
        Some(&jwt),
        Some(json!({ "filename": "a.pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validated_listing_reports_reconciled_orphans() {
    let (app, _objects) = app();
    let jwt = token("owner-1");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Scans" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    // Confirm an upload whose object never arrived.
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/projects/{project_id}/uploads/ghost-upload/complete"),
        Some(&jwt),
        Some(json!({
            "filename": "ghost.png",
            "bucket": "raw-bucket",
            "objectKey": "private/owner-1/ghost.png",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/files?validate=1"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reconciled"], 1);
    assert_eq!(body["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn download_returns_a_presigned_url_pair() {
    let (app, objects) = app();
    let jwt = token("owner-1");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Docs" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    objects.put_object("raw-bucket", "private/owner-1/report.csv");
    let (_, _) = send(
        &app,
        Method::POST,
        &format!("/projects/{project_id}/uploads/file-1/complete"),
        Some(&jwt),
        Some(json!({
            "filename": "report.csv",
            "bucket": "raw-bucket",
            "objectKey": "private/owner-1/report.csv",
        })),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/files/file-1/download"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["inlineUrl"].as_str().unwrap().contains("raw-bucket"));
    assert!(body["downloadUrl"].as_str().unwrap().contains("report.csv"));

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}/files/missing/download"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_project_cascades_and_reports_counts() {
    let (app, objects) = app();
    let jwt = token("owner-1");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Doomed" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    for i in 0..2 {
        let key = format!("private/owner-1/doomed-{i}");
        objects.put_object("raw-bucket", &key);
        send(
            &app,
            Method::POST,
            &format!("/projects/{project_id}/uploads/file-{i}/complete"),
            Some(&jwt),
            Some(json!({
                "filename": format!("f{i}.bin"),
                "bucket": "raw-bucket",
                "objectKey": key,
            })),
        )
        .await;
    }

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/projects/{project_id}"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["deletedFileRows"], 2);
    assert_eq!(body["deletedObjects"], 2);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/projects/{project_id}"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/projects/{project_id}"),
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_stats_aggregate_projects_and_bytes() {
    let (app, objects) = app();
    let jwt = token("owner-1");

    let (_, body) = send(
        &app,
        Method::POST,
        "/projects",
        Some(&jwt),
        Some(json!({ "name": "Stats" })),
    )
    .await;
    let project_id = body["project"]["projectId"].as_str().unwrap().to_string();

    objects.put_object("raw-bucket", "private/owner-1/counted.bin");
    send(
        &app,
        Method::POST,
        &format!("/projects/{project_id}/uploads/counted/complete"),
        Some(&jwt),
        Some(json!({
            "filename": "counted.bin",
            "sizeBytes": 2048,
            "bucket": "raw-bucket",
            "objectKey": "private/owner-1/counted.bin",
        })),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/me/stats", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalProjects"], 1);
    assert_eq!(body["filesConverted"], 1);
    assert_eq!(body["uploadedBytes"], 2048);
    assert_eq!(body["spaceSavedBytes"], 0);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
