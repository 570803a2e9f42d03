//! Composite-key construction for the single-table metadata layout.
//!
//! Every record lives under the owner's partition `USER#<ownerId>`. The sort
//! key carries the entity kind and its identity:
//!
//! - projects: `PROJECT#<createdAtIso>#<projectId>` — a reverse scan of the
//!   `PROJECT#` prefix returns projects newest-first.
//! - files: `FILE#<projectId>#<fileId>` — deterministic, so a file record can
//!   be addressed (and deleted) without a preceding scan, and re-confirming
//!   the same upload id lands on the same key.
//!
//! Pure string composition. Nothing here performs I/O or panics.

pub const PROJECT_SK_PREFIX: &str = "PROJECT#";
pub const FILE_SK_PREFIX: &str = "FILE#";

/// Partition key for all of an owner's project records.
pub fn project_partition_key(owner_id: &str) -> String {
    format!("USER#{owner_id}")
}

/// Partition key for all of an owner's file records. Same partition as
/// projects; the sort-key prefix is what separates the two kinds.
pub fn file_partition_key(owner_id: &str) -> String {
    format!("USER#{owner_id}")
}

/// Sort key for a project record. `created_at` is the ISO-8601 creation
/// timestamp, which makes reverse-order scans return newest projects first.
pub fn project_sort_key(created_at: &str, project_id: &str) -> String {
    format!("{PROJECT_SK_PREFIX}{created_at}#{project_id}")
}

/// Sort key for a file record.
pub fn file_sort_key(project_id: &str, file_id: &str) -> String {
    format!("{FILE_SK_PREFIX}{project_id}#{file_id}")
}

/// Sort-key prefix selecting every file of one project.
pub fn file_sort_key_prefix(project_id: &str) -> String {
    format!("{FILE_SK_PREFIX}{project_id}#")
}

/// Inverse of [`file_sort_key`]. Returns `(project_id, file_id)`, or `None`
/// when the input is not a well-formed file sort key. Ids never contain `#`
/// (they are UUIDs), so the split is unambiguous.
pub fn parse_file_sort_key(sk: &str) -> Option<(String, String)> {
    let rest = sk.strip_prefix(FILE_SK_PREFIX)?;
    let (project_id, file_id) = rest.split_once('#')?;
    if project_id.is_empty() || file_id.is_empty() || file_id.contains('#') {
        return None;
    }
    Some((project_id.to_string(), file_id.to_string()))
}
