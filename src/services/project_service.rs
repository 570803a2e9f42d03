//! Project repository — CRUD and listing over the PROJECT entity kind.
//!
//! Owns the uniqueness and existence invariants for projects. There is no
//! index on `projectId` alone, so [`ProjectService::find_by_id`] is a prefix
//! scan with an in-memory filter that follows continuation tokens; all
//! mutations re-check existence at write time with a conditional write, so a
//! lookup racing a delete degrades to `NotFound` instead of corrupting state.

use crate::keys;
use crate::models::now_iso;
use crate::models::project::{Project, ProjectStatus};
use crate::services::metadata_store::{
    DeleteOutcome, Document, MAX_SCAN_PAGES, MetaError, MetadataStore, PutOutcome, QueryOptions,
    UpdateOutcome,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Page size for listing and scan-with-filter lookups.
const PAGE_SIZE: i32 = 50;

const MAX_NAME_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{0}")]
    Validation(String),
    #[error("project not found")]
    NotFound,
    #[error("project already exists")]
    Conflict,
    #[error(transparent)]
    Meta(#[from] MetaError),
}

pub type ProjectResult<T> = Result<T, ProjectError>;

/// A project together with the composite key it was found under, so callers
/// can address the same record again without re-deriving the sort key.
#[derive(Debug, Clone)]
pub struct LocatedProject {
    pub pk: String,
    pub sk: String,
    pub project: Project,
}

/// Aggregate usage numbers for one owner. `space_saved_bytes` stays zero
/// until a processing pipeline exists; `files_converted` counts uploads.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerStats {
    pub total_projects: u64,
    pub files_converted: u64,
    pub space_saved_bytes: u64,
    pub uploaded_bytes: u64,
}

#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn MetadataStore>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Trim and bound the display name. Runs before any store call.
    fn validate_name(name: &str) -> ProjectResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ProjectError::Validation("name is required".into()));
        }
        if trimmed.chars().count() > MAX_NAME_CHARS {
            return Err(ProjectError::Validation("name too long".into()));
        }
        Ok(trimmed.to_string())
    }

    pub async fn create(&self, owner_id: &str, name: &str) -> ProjectResult<Project> {
        let name = Self::validate_name(name)?;
        let project_id = Uuid::new_v4().to_string();
        let created_at = now_iso();
        self.create_with_id(owner_id, name, project_id, created_at)
            .await
    }

    /// Creation with caller-supplied identity, split out so tests can force a
    /// key collision.
    async fn create_with_id(
        &self,
        owner_id: &str,
        name: String,
        project_id: String,
        created_at: String,
    ) -> ProjectResult<Project> {
        let project = Project {
            project_id,
            name,
            created_at: created_at.clone(),
            updated_at: created_at.clone(),
            status: ProjectStatus::Active,
        };

        let pk = keys::project_partition_key(owner_id);
        let sk = keys::project_sort_key(&created_at, &project.project_id);
        match self
            .store
            .put_if_absent(&pk, &sk, project_document(owner_id, &project))
            .await?
        {
            PutOutcome::Created => Ok(project),
            PutOutcome::AlreadyExists => Err(ProjectError::Conflict),
        }
    }

    /// Newest-first listing, bounded to one page. The ordering comes from the
    /// timestamp-prefixed sort key read in reverse, not from a sort step.
    pub async fn list(&self, owner_id: &str) -> ProjectResult<Vec<Project>> {
        let pk = keys::project_partition_key(owner_id);
        let page = self
            .store
            .query_by_prefix(
                &pk,
                keys::PROJECT_SK_PREFIX,
                QueryOptions {
                    limit: Some(PAGE_SIZE),
                    scan_forward: false,
                    ..Default::default()
                },
            )
            .await?;
        Ok(page
            .items
            .iter()
            .filter_map(project_from_document)
            .map(|(_, project)| project)
            .collect())
    }

    /// Locate a project by id. No key materializes from `projectId` alone, so
    /// this scans the `PROJECT#` prefix and filters in memory, following
    /// continuation tokens until a match is found or pages run out.
    pub async fn find_by_id(
        &self,
        owner_id: &str,
        project_id: &str,
    ) -> ProjectResult<Option<LocatedProject>> {
        self.find_by_id_paged(owner_id, project_id, PAGE_SIZE).await
    }

    async fn find_by_id_paged(
        &self,
        owner_id: &str,
        project_id: &str,
        page_size: i32,
    ) -> ProjectResult<Option<LocatedProject>> {
        let pk = keys::project_partition_key(owner_id);
        let mut continuation = None;

        for _ in 0..MAX_SCAN_PAGES {
            let page = self
                .store
                .query_by_prefix(
                    &pk,
                    keys::PROJECT_SK_PREFIX,
                    QueryOptions {
                        consistent_read: true,
                        limit: Some(page_size),
                        scan_forward: false,
                        continuation: continuation.take(),
                    },
                )
                .await?;

            for item in &page.items {
                if item.get("projectId").and_then(Value::as_str) != Some(project_id) {
                    continue;
                }
                if let Some((sk, project)) = project_from_document(item) {
                    return Ok(Some(LocatedProject {
                        pk,
                        sk,
                        project,
                    }));
                }
            }

            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(None)
    }

    /// Rename a project. Existence is re-checked by the conditional update,
    /// so a delete racing between the lookup and the write surfaces as
    /// `NotFound` rather than resurrecting the record or crashing.
    pub async fn rename(
        &self,
        owner_id: &str,
        project_id: &str,
        new_name: &str,
    ) -> ProjectResult<Project> {
        let name = Self::validate_name(new_name)?;
        let located = self
            .find_by_id(owner_id, project_id)
            .await?
            .ok_or(ProjectError::NotFound)?;

        let updated_at = now_iso();
        let mut patch = Document::new();
        patch.insert("name".to_string(), Value::String(name.clone()));
        patch.insert("updatedAt".to_string(), Value::String(updated_at.clone()));

        match self
            .store
            .update_if_exists(&located.pk, &located.sk, patch)
            .await?
        {
            UpdateOutcome::Updated => Ok(Project {
                name,
                updated_at,
                ..located.project
            }),
            UpdateOutcome::NotFound => Err(ProjectError::NotFound),
        }
    }

    /// Delete a previously located project record. The file cascade runs
    /// before this, and the conditional delete runs last so a racing delete
    /// maps to `NotFound`, never a double removal.
    pub async fn delete_located(&self, pk: &str, sk: &str) -> ProjectResult<()> {
        match self.store.delete_if_exists(pk, sk).await? {
            DeleteOutcome::Deleted => Ok(()),
            DeleteOutcome::NotFound => Err(ProjectError::NotFound),
        }
    }

    /// Aggregate project/file counts and uploaded bytes for one owner.
    pub async fn owner_stats(&self, owner_id: &str) -> ProjectResult<OwnerStats> {
        let pk = keys::project_partition_key(owner_id);
        let mut stats = OwnerStats::default();

        let mut continuation = None;
        for _ in 0..MAX_SCAN_PAGES {
            let page = self
                .store
                .query_by_prefix(
                    &pk,
                    keys::PROJECT_SK_PREFIX,
                    QueryOptions {
                        limit: Some(PAGE_SIZE),
                        scan_forward: false,
                        continuation: continuation.take(),
                        ..Default::default()
                    },
                )
                .await?;
            stats.total_projects += page.items.len() as u64;
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        let mut continuation = None;
        for _ in 0..MAX_SCAN_PAGES {
            let page = self
                .store
                .query_by_prefix(
                    &pk,
                    keys::FILE_SK_PREFIX,
                    QueryOptions {
                        limit: Some(PAGE_SIZE),
                        continuation: continuation.take(),
                        ..Default::default()
                    },
                )
                .await?;
            stats.files_converted += page.items.len() as u64;
            stats.uploaded_bytes += page
                .items
                .iter()
                .filter_map(|item| item.get("sizeBytes").and_then(Value::as_i64))
                .filter(|n| *n > 0)
                .sum::<i64>() as u64;
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(stats)
    }
}

/// Store-side representation: the serialized project plus the entity
/// discriminator and the denormalized owner id.
fn project_document(owner_id: &str, project: &Project) -> Document {
    let mut doc = match serde_json::to_value(project) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    };
    doc.insert("entity".to_string(), Value::String("PROJECT".into()));
    doc.insert("userSub".to_string(), Value::String(owner_id.into()));
    doc
}

/// Inverse of [`project_document`]: returns the record's sort key and the
/// parsed project, or `None` for malformed rows.
fn project_from_document(doc: &Document) -> Option<(String, Project)> {
    let sk = doc.get("SK").and_then(Value::as_str)?.to_string();
    let project = serde_json::from_value(Value::Object(doc.clone())).ok()?;
    Some((sk, project))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata_store::MemoryMetadataStore;
    use std::time::Duration;

    fn service() -> ProjectService {
        ProjectService::new(Arc::new(MemoryMetadataStore::new()))
    }

    #[tokio::test]
    async fn create_validates_name_before_any_store_call() {
        let svc = service();
        assert!(matches!(
            svc.create("owner", "   ").await,
            Err(ProjectError::Validation(_))
        ));
        assert!(matches!(
            svc.create("owner", &"x".repeat(81)).await,
            Err(ProjectError::Validation(_))
        ));

        let project = svc.create("owner", "  Tax Docs  ").await.unwrap();
        assert_eq!(project.name, "Tax Docs");
        assert_eq!(project.created_at, project.updated_at);
        assert_eq!(project.status, ProjectStatus::Active);
    }

    #[tokio::test]
    async fn forced_id_collision_yields_exactly_one_conflict() {
        let svc = service();
        let first = svc
            .create_with_id(
                "owner",
                "one".into(),
                "fixed-id".into(),
                "2026-01-01T00:00:00.000Z".into(),
            )
            .await;
        let second = svc
            .create_with_id(
                "owner",
                "two".into(),
                "fixed-id".into(),
                "2026-01-01T00:00:00.000Z".into(),
            )
            .await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(ProjectError::Conflict)));

        let listed = svc.list("owner").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "one");
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let svc = service();
        for name in ["first", "second", "third"] {
            svc.create("owner", name).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let names: Vec<String> = svc
            .list("owner")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn find_by_id_follows_pages_past_the_first() {
        let svc = service();
        // Oldest project scans last; with page size 2 it sits on page 3.
        let target = svc.create("owner", "target").await.unwrap();
        for i in 0..4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            svc.create("owner", &format!("filler-{i}")).await.unwrap();
        }

        let located = svc
            .find_by_id_paged("owner", &target.project_id, 2)
            .await
            .unwrap()
            .expect("target beyond the first page must still be found");
        assert_eq!(located.project.project_id, target.project_id);
        assert!(located.sk.contains(&target.project_id));
    }

    #[tokio::test]
    async fn find_by_id_is_scoped_to_the_owner() {
        let svc = service();
        let project = svc.create("owner-a", "mine").await.unwrap();
        let found = svc.find_by_id("owner-b", &project.project_id).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn rename_updates_name_and_timestamp() {
        let svc = service();
        let project = svc.create("owner", "Tax Docs").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let renamed = svc
            .rename("owner", &project.project_id, "Tax Docs 2026")
            .await
            .unwrap();
        assert_eq!(renamed.name, "Tax Docs 2026");
        assert!(renamed.updated_at > renamed.created_at);

        let listed = svc.list("owner").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Tax Docs 2026");
    }

    #[tokio::test]
    async fn rename_of_missing_project_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.rename("owner", "nope", "name").await,
            Err(ProjectError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_rename_and_delete_never_crash() {
        let svc = service();
        let project = svc.create("owner", "racy").await.unwrap();
        let located = svc
            .find_by_id("owner", &project.project_id)
            .await
            .unwrap()
            .unwrap();

        let (rename_result, delete_result) = tokio::join!(
            svc.rename("owner", &project.project_id, "renamed"),
            svc.delete_located(&located.pk, &located.sk),
        );

        // Whichever write lands second observes NotFound; neither path may
        // surface any other error.
        assert!(matches!(rename_result, Ok(_) | Err(ProjectError::NotFound)));
        assert!(matches!(delete_result, Ok(()) | Err(ProjectError::NotFound)));
        if delete_result.is_ok() {
            assert!(
                svc.find_by_id("owner", &project.project_id)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
    }

    #[tokio::test]
    async fn second_delete_observes_not_found() {
        let svc = service();
        let project = svc.create("owner", "gone").await.unwrap();
        let located = svc
            .find_by_id("owner", &project.project_id)
            .await
            .unwrap()
            .unwrap();

        svc.delete_located(&located.pk, &located.sk).await.unwrap();
        assert!(matches!(
            svc.delete_located(&located.pk, &located.sk).await,
            Err(ProjectError::NotFound)
        ));
    }

    #[tokio::test]
    async fn owner_stats_count_projects_and_files() {
        let svc = service();
        svc.create("owner", "a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        svc.create("owner", "b").await.unwrap();

        let stats = svc.owner_stats("owner").await.unwrap();
        assert_eq!(stats.total_projects, 2);
        assert_eq!(stats.files_converted, 0);
        assert_eq!(stats.uploaded_bytes, 0);
        assert_eq!(stats.space_saved_bytes, 0);
    }
}
