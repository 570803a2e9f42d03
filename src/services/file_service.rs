//! File repository — the two-phase upload protocol, scoped listing with
//! opportunistic reconciliation, and cascading delete.
//!
//! The metadata store and the object store fail independently, so the
//! protocol is arranged to keep them eventually consistent:
//!
//! 1. `create_upload_slot` issues a presigned PUT and writes **no** metadata.
//!    An abandoned slot expires on its own and leaves no trace; a metadata
//!    row pointing at bytes that never arrived would be worse.
//! 2. The client uploads directly to the object store.
//! 3. `confirm_upload` writes the metadata row under the deterministic
//!    `FILE#<projectId>#<fileId>` key with a conditional create. A duplicate
//!    confirm (retries after a client timeout are routine) returns the
//!    existing record instead of erroring.
//!
//! Object-store failures on the delete/head paths are never fatal: they are
//! logged and the operation continues with the conservative assumption.
//! Metadata read failures always propagate.

use crate::keys;
use crate::models::file::{FileRecord, FileStatus};
use crate::models::now_iso;
use crate::models::project::Project;
use crate::services::metadata_store::{
    DeleteOutcome, Document, MAX_SCAN_PAGES, MetaError, MetadataStore, PutOutcome, QueryOptions,
};
use crate::services::object_store::{ObjectError, ObjectExistence, ObjectStore};
use crate::services::project_service::{ProjectError, ProjectService};
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Cap on simultaneous `head` probes during reconciliation.
const HEAD_CONCURRENCY: usize = 6;

const PAGE_SIZE: i32 = 50;
const MAX_UPLOAD_BYTES: i64 = 250 * 1024 * 1024;
const MAX_FILENAME_CHARS: usize = 120;
const MAX_CONTENT_TYPE_CHARS: usize = 200;
const MAX_SLUG_CHARS: usize = 60;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{0}")]
    Validation(String),
    #[error("project not found")]
    ProjectNotFound,
    #[error("project is not active")]
    ProjectInactive,
    #[error("file not found")]
    NotFound,
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Object(#[from] ObjectError),
}

pub type FileResult<T> = Result<T, FileError>;

/// Request body for a new upload slot. Everything is optional on the wire;
/// validation happens here so missing fields read as 400, not 422.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUpload {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
}

/// Request body confirming a completed client-direct upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUpload {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
}

/// An issued upload slot: where the client should PUT, and under which
/// identity it must confirm.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub upload_id: String,
    pub file_id: String,
    pub bucket: String,
    pub object_key: String,
    pub put_url: String,
    pub expires_in_seconds: u64,
    pub headers: UploadHeaders,
}

/// Headers the client must send with the presigned PUT; the signature
/// covers the content type.
#[derive(Debug, Clone, Serialize)]
pub struct UploadHeaders {
    #[serde(rename = "Content-Type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrls {
    pub inline_url: String,
    pub download_url: String,
}

#[derive(Debug, Default)]
pub struct FileListing {
    pub files: Vec<FileRecord>,
    /// Orphaned metadata rows removed during validation.
    pub reconciled: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CascadeResult {
    pub deleted_file_rows: u64,
    pub deleted_objects: u64,
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    projects: ProjectService,
    bucket: String,
    put_url_ttl: Duration,
    get_url_ttl: Duration,
}

impl FileService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        projects: ProjectService,
        bucket: impl Into<String>,
        put_url_ttl: Duration,
        get_url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            projects,
            bucket: bucket.into(),
            put_url_ttl,
            get_url_ttl,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Issue a presigned upload slot. The project must exist and be active.
    /// Deliberately writes no metadata: the record appears only at confirm.
    pub async fn create_upload_slot(
        &self,
        owner_id: &str,
        project_id: &str,
        req: NewUpload,
    ) -> FileResult<UploadSlot> {
        let raw_name = req.filename.unwrap_or_default();
        if raw_name.trim().is_empty() {
            return Err(FileError::Validation("filename is required".into()));
        }
        if let Some(size) = req.size_bytes {
            if size <= 0 || size > MAX_UPLOAD_BYTES {
                return Err(FileError::Validation("invalid sizeBytes".into()));
            }
        }
        let filename = sanitize_filename(&raw_name);
        let content_type = normalize_content_type(req.content_type.as_deref().unwrap_or(""));

        let project = self.require_project(owner_id, project_id).await?;
        if !project.is_active() {
            return Err(FileError::ProjectInactive);
        }

        let file_id = Uuid::new_v4().to_string();
        let object_key = build_object_key(
            owner_id,
            &project_slug(&project, project_id),
            project_id,
            &file_id,
            &filename,
        );
        let put_url = self
            .objects
            .presign_put(&self.bucket, &object_key, &content_type, self.put_url_ttl)
            .await?;

        Ok(UploadSlot {
            upload_id: file_id.clone(),
            file_id,
            bucket: self.bucket.clone(),
            object_key,
            put_url,
            expires_in_seconds: self.put_url_ttl.as_secs(),
            headers: UploadHeaders { content_type },
        })
    }

    /// Write the metadata record for a completed upload. Idempotent: a
    /// duplicate confirm for the same `fileId` returns the stored record.
    pub async fn confirm_upload(
        &self,
        owner_id: &str,
        project_id: &str,
        file_id: &str,
        req: ConfirmUpload,
    ) -> FileResult<FileRecord> {
        let raw_name = req.filename.unwrap_or_default();
        let bucket = req.bucket.unwrap_or_default().trim().to_string();
        let object_key = req.object_key.unwrap_or_default().trim().to_string();
        if raw_name.trim().is_empty() || bucket.is_empty() || object_key.is_empty() {
            return Err(FileError::Validation(
                "filename, bucket, objectKey are required".into(),
            ));
        }

        let filename = sanitize_filename(&raw_name);
        let raw_ct = req.content_type.unwrap_or_default();
        let normalized_ct = normalize_content_type(&raw_ct);
        let content_type = if !raw_ct.trim().is_empty() && normalized_ct != DEFAULT_CONTENT_TYPE {
            normalized_ct
        } else {
            guess_content_type(&filename)
        };
        // A nonsensical declared size is stored as unknown, not rejected.
        let size_bytes = req.size_bytes.filter(|n| *n >= 0);

        let created_at = now_iso();
        let record = FileRecord {
            file_id: file_id.to_string(),
            project_id: project_id.to_string(),
            filename,
            content_type,
            size_bytes,
            status: FileStatus::Queued,
            bucket,
            object_key,
            created_at: created_at.clone(),
            updated_at: created_at,
        };

        let pk = keys::file_partition_key(owner_id);
        let sk = keys::file_sort_key(project_id, file_id);
        match self
            .store
            .put_if_absent(&pk, &sk, file_document(owner_id, &record))
            .await?
        {
            PutOutcome::Created => Ok(record),
            PutOutcome::AlreadyExists => {
                // Retried confirm: hand back what the first confirm wrote.
                let existing = self.store.get(&pk, &sk).await?;
                existing
                    .as_ref()
                    .and_then(file_from_document)
                    .ok_or(FileError::NotFound)
            }
        }
    }

    /// List a project's files, newest first. With `validate`, every listed
    /// record's backing object is head-checked (bounded concurrency) and
    /// records whose object is confirmed absent are reconciled away. An
    /// inconclusive check keeps the record: metadata is only destroyed on a
    /// positive "absent".
    pub async fn list(
        &self,
        owner_id: &str,
        project_id: &str,
        validate: bool,
    ) -> FileResult<FileListing> {
        let mut files = self
            .collect_project_files(owner_id, project_id, false, PAGE_SIZE)
            .await?;

        let mut reconciled = 0;
        if validate {
            let checks: Vec<(FileRecord, ObjectExistence)> =
                stream::iter(files.into_iter().map(|record| {
                    let objects = Arc::clone(&self.objects);
                    async move {
                        let existence = objects.head(&record.bucket, &record.object_key).await;
                        (record, existence)
                    }
                }))
                .buffer_unordered(HEAD_CONCURRENCY)
                .collect()
                .await;

            let pk = keys::file_partition_key(owner_id);
            let mut kept = Vec::with_capacity(checks.len());
            for (record, existence) in checks {
                if existence == ObjectExistence::Absent {
                    reconciled += 1;
                    let sk = keys::file_sort_key(project_id, &record.file_id);
                    if let Err(err) = self.store.delete_if_exists(&pk, &sk).await {
                        warn!(
                            file_id = %record.file_id,
                            error = %err,
                            "failed to remove orphaned file record"
                        );
                    }
                } else {
                    kept.push(record);
                }
            }
            files = kept;
        }

        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(FileListing { files, reconciled })
    }

    /// Delete one file: best-effort object removal first (the record owns the
    /// object's lifecycle), then the metadata row.
    pub async fn delete(&self, owner_id: &str, project_id: &str, file_id: &str) -> FileResult<()> {
        let pk = keys::file_partition_key(owner_id);
        let sk = keys::file_sort_key(project_id, file_id);
        let doc = self.store.get(&pk, &sk).await?.ok_or(FileError::NotFound)?;

        let bucket = doc.get("bucket").and_then(Value::as_str).unwrap_or("");
        let object_key = doc.get("objectKey").and_then(Value::as_str).unwrap_or("");
        if !bucket.is_empty() && !object_key.is_empty() {
            // The object may already be gone out-of-band; that must not
            // block removing the row.
            if let Err(err) = self.objects.delete(bucket, object_key).await {
                warn!(bucket, object_key, error = %err, "object delete failed, continuing");
            }
        }

        // A racing delete already removed the row; the end state is the same.
        self.store.delete_if_exists(&pk, &sk).await?;
        Ok(())
    }

    /// Presigned download URLs for one file: an inline one and one carrying
    /// an attachment disposition under the stored filename.
    pub async fn download_urls(
        &self,
        owner_id: &str,
        project_id: &str,
        file_id: &str,
    ) -> FileResult<DownloadUrls> {
        let pk = keys::file_partition_key(owner_id);
        let sk = keys::file_sort_key(project_id, file_id);
        let doc = self.store.get(&pk, &sk).await?.ok_or(FileError::NotFound)?;

        let bucket = doc
            .get("bucket")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let object_key = doc
            .get("objectKey")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let filename = doc
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("download");

        let inline_url = self
            .objects
            .presign_get(bucket, object_key, None, self.get_url_ttl)
            .await?;
        let download_url = self
            .objects
            .presign_get(bucket, object_key, Some(filename), self.get_url_ttl)
            .await?;

        Ok(DownloadUrls {
            inline_url,
            download_url,
        })
    }

    /// Remove every file of a project: best-effort object delete, then row
    /// delete, per file. One file's failure never aborts the sweep; the
    /// caller gets counts of what actually went away.
    pub async fn delete_all_for_project(
        &self,
        owner_id: &str,
        project_id: &str,
    ) -> FileResult<CascadeResult> {
        let files = self
            .collect_project_files(owner_id, project_id, true, PAGE_SIZE)
            .await?;

        let pk = keys::file_partition_key(owner_id);
        let mut result = CascadeResult::default();
        for record in files {
            match self.objects.delete(&record.bucket, &record.object_key).await {
                Ok(()) => result.deleted_objects += 1,
                Err(err) => {
                    warn!(
                        file_id = %record.file_id,
                        error = %err,
                        "object delete failed during cascade, continuing"
                    );
                }
            }

            let sk = keys::file_sort_key(project_id, &record.file_id);
            match self.store.delete_if_exists(&pk, &sk).await {
                Ok(DeleteOutcome::Deleted) => {
                    result.deleted_file_rows += 1;
                }
                Ok(DeleteOutcome::NotFound) => {}
                Err(err) => {
                    warn!(
                        file_id = %record.file_id,
                        error = %err,
                        "file row delete failed during cascade, continuing"
                    );
                }
            }
        }

        Ok(result)
    }

    async fn require_project(&self, owner_id: &str, project_id: &str) -> FileResult<Project> {
        let located = self
            .projects
            .find_by_id(owner_id, project_id)
            .await
            .map_err(|err| match err {
                ProjectError::Meta(meta) => FileError::Meta(meta),
                _ => FileError::ProjectNotFound,
            })?;
        located
            .map(|located| located.project)
            .ok_or(FileError::ProjectNotFound)
    }

    /// All file records of one project, via a direct prefix query on
    /// `FILE#<projectId>#`, following continuation tokens up to the scan
    /// ceiling.
    async fn collect_project_files(
        &self,
        owner_id: &str,
        project_id: &str,
        consistent_read: bool,
        page_size: i32,
    ) -> FileResult<Vec<FileRecord>> {
        let pk = keys::file_partition_key(owner_id);
        let prefix = keys::file_sort_key_prefix(project_id);
        let mut out = Vec::new();
        let mut continuation = None;

        for _ in 0..MAX_SCAN_PAGES {
            let page = self
                .store
                .query_by_prefix(
                    &pk,
                    &prefix,
                    QueryOptions {
                        consistent_read,
                        limit: Some(page_size),
                        scan_forward: true,
                        continuation: continuation.take(),
                    },
                )
                .await?;
            // Rows whose sort key does not parse back to this project are
            // malformed; skip them rather than feeding them to callers.
            out.extend(
                page.items
                    .iter()
                    .filter(|doc| {
                        doc.get("SK")
                            .and_then(Value::as_str)
                            .and_then(keys::parse_file_sort_key)
                            .is_some_and(|(pid, _)| pid == project_id)
                    })
                    .filter_map(file_from_document),
            );
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(out)
    }
}

/// Strip path and control characters from a client-supplied filename, bound
/// its length, and never return an empty name.
fn sanitize_filename(raw: &str) -> String {
    let trimmed = raw.trim();
    let base = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let bounded: String = cleaned
        .trim_start_matches('.')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();
    if bounded.is_empty() {
        "file".to_string()
    } else {
        bounded
    }
}

fn normalize_content_type(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return DEFAULT_CONTENT_TYPE.to_string();
    }
    trimmed.chars().take(MAX_CONTENT_TYPE_CHARS).collect()
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Lowercase ASCII slug of a project name; empty when nothing survives.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let bounded: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    bounded.trim_matches('-').to_string()
}

/// Slug for the object-key path segment, with a deterministic fallback when
/// the project name yields nothing sluggable.
fn project_slug(project: &Project, project_id: &str) -> String {
    let slug = slugify(&project.name);
    if !slug.is_empty() {
        return slug;
    }
    let short = project_id.get(..8).unwrap_or(project_id);
    format!("project-{short}")
}

/// The object key is a pure function of the upload's identity, so repeated
/// slot requests for the same generated id land on the same key.
fn build_object_key(
    owner_id: &str,
    project_slug: &str,
    project_id: &str,
    file_id: &str,
    filename: &str,
) -> String {
    format!("private/{owner_id}/projects/{project_slug}--{project_id}/raw/{file_id}/{filename}")
}

fn file_document(owner_id: &str, record: &FileRecord) -> Document {
    let mut doc = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    };
    doc.insert("entity".to_string(), Value::String("FILE".into()));
    doc.insert("userSub".to_string(), Value::String(owner_id.into()));
    doc
}

fn file_from_document(doc: &Document) -> Option<FileRecord> {
    serde_json::from_value(Value::Object(doc.clone())).ok()
}
