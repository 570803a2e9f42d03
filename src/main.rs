use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use axum::Router;
use filedeck::auth::{Hs256Gate, IdentityGate};
use filedeck::config::AppConfig;
use filedeck::routes::routes::routes;
use filedeck::services::file_service::FileService;
use filedeck::services::metadata_store::{DynamoMetadataStore, MetadataStore};
use filedeck::services::object_store::{ObjectStore, S3ObjectStore};
use filedeck::services::project_service::ProjectService;
use filedeck::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Configuration (missing required vars are fatal here) ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        table = %cfg.table_name,
        bucket = %cfg.raw_bucket,
        region = %cfg.region,
        "starting filedeck"
    );

    // --- AWS clients: created once, shared by every request ---
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(cfg.region.clone()))
        .load()
        .await;
    let dynamo = aws_sdk_dynamodb::Client::new(&aws_config);
    let s3 = aws_sdk_s3::Client::new(&aws_config);

    // --- Dependency wiring ---
    let meta: Arc<dyn MetadataStore> =
        Arc::new(DynamoMetadataStore::new(dynamo, cfg.table_name.clone()));
    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(s3));
    let identity: Arc<dyn IdentityGate> = Arc::new(Hs256Gate::new(&cfg.auth_secret));

    let projects = ProjectService::new(meta.clone());
    let files = FileService::new(
        meta.clone(),
        objects.clone(),
        projects.clone(),
        cfg.raw_bucket.clone(),
        Duration::from_secs(cfg.put_url_ttl_secs),
        Duration::from_secs(cfg.get_url_ttl_secs),
    );

    let state = AppState {
        identity,
        projects,
        files,
        meta,
        objects,
    };

    // --- Build router ---
    let app: Router = routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
