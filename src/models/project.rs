//! Represents a project — the container an owner uploads files into.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a project. Only `active` projects accept new uploads;
/// anything else answers upload-slot requests with 410 Gone.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

/// A project owned by a single subject.
///
/// `(ownerId, projectId)` is unique, enforced by a conditional create on the
/// composite key. The owner id is the partition key and is not repeated here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Opaque unique identifier, generated at creation, immutable.
    pub project_id: String,

    /// Display name, trimmed, 1–80 characters.
    pub name: String,

    /// ISO-8601 creation timestamp. Also embedded in the sort key.
    pub created_at: String,

    /// ISO-8601 timestamp of the last mutation; never earlier than `created_at`.
    pub updated_at: String,

    pub status: ProjectStatus,
}

impl Project {
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }
}
