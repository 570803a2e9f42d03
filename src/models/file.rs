//! Represents an uploaded file's metadata record.

use serde::{Deserialize, Serialize};

/// Processing state of a file. The upload path only ever writes `queued`;
/// the remaining states exist for the processing pipeline that consumes
/// these records downstream.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

/// Metadata for one uploaded object, scoped to a project.
///
/// The record is the sole owner of the backing object's lifecycle: deleting
/// the record must first attempt to delete `bucket`/`object_key`. The record
/// is written only at upload confirmation, never at slot-request time, so a
/// row always refers to an object some client claimed to have uploaded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_id: String,

    /// Denormalized parent project id. The store does not enforce the
    /// relationship; the application checks it on every scoped operation.
    pub project_id: String,

    /// Sanitized display filename; never empty.
    pub filename: String,

    /// Normalized MIME type; defaults to `application/octet-stream`.
    pub content_type: String,

    /// Client-declared size. `None` when unknown; never verified against the
    /// stored object.
    pub size_bytes: Option<i64>,

    pub status: FileStatus,

    /// Location of the backing object in the object store.
    pub bucket: String,
    pub object_key: String,

    pub created_at: String,
    pub updated_at: String,
}
