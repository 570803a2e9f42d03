//! Shared request state: every collaborator is constructed once at process
//! start and injected here, so handlers see plain trait objects and cheap
//! clones instead of ambient singletons.

use crate::auth::IdentityGate;
use crate::services::file_service::FileService;
use crate::services::metadata_store::MetadataStore;
use crate::services::object_store::ObjectStore;
use crate::services::project_service::ProjectService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityGate>,
    pub projects: ProjectService,
    pub files: FileService,
    /// Direct store handles, used only by the readiness probes.
    pub meta: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
}
