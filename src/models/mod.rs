//! Core data models for the project/file metadata service.
//!
//! Both entity kinds share one logical table; the structs here are the
//! application-side view, serialized as JSON both toward the document store
//! and toward HTTP clients.

pub mod file;
pub mod project;

use chrono::{SecondsFormat, Utc};

/// Current UTC time as an ISO-8601 string with millisecond precision.
///
/// Timestamps are kept as strings because the project sort key embeds the
/// creation timestamp verbatim; one formatting pass keeps the record
/// attribute and the key byte-identical. ISO-8601 UTC strings compare
/// lexicographically in time order.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
