use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments. The metadata table,
/// object bucket, storage region, and auth secret are required: a missing
/// value is a startup failure, never a per-request one.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub table_name: String,
    pub raw_bucket: String,
    pub region: String,
    pub auth_secret: String,
    pub put_url_ttl_secs: u64,
    pub get_url_ttl_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Project/file metadata API")]
pub struct Args {
    /// Host to bind to (overrides FILEDECK_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEDECK_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Metadata table name (overrides FILEDECK_TABLE)
    #[arg(long)]
    pub table: Option<String>,

    /// Raw-upload bucket name (overrides FILEDECK_RAW_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Storage region (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,
}

fn must_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("missing required env var {name}"))
}

fn opt_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .with_context(|| format!("parsing {name} value `{value}`")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        let host = args
            .host
            .or_else(|| opt_env("FILEDECK_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => match env::var("FILEDECK_PORT") {
                Ok(value) => value
                    .parse::<u16>()
                    .with_context(|| format!("parsing FILEDECK_PORT value `{value}`"))?,
                Err(_) => 3000,
            },
        };

        let table_name = match args.table {
            Some(table) => table,
            None => must_env("FILEDECK_TABLE")?,
        };
        let raw_bucket = match args.bucket {
            Some(bucket) => bucket,
            None => must_env("FILEDECK_RAW_BUCKET")?,
        };
        let region = args
            .region
            .or_else(|| opt_env("AWS_REGION"))
            .or_else(|| opt_env("AWS_DEFAULT_REGION"))
            .context("storage region not configured (AWS_REGION)")?;
        let auth_secret = must_env("FILEDECK_AUTH_SECRET")?;

        Ok(Self {
            host,
            port,
            table_name,
            raw_bucket,
            region,
            auth_secret,
            put_url_ttl_secs: env_u64("FILEDECK_PUT_URL_TTL_SECS", 300)?,
            get_url_ttl_secs: env_u64("FILEDECK_GET_URL_TTL_SECS", 60)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
