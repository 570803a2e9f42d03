//! filedeck — multi-tenant project/file metadata service.
//!
//! Projects and their uploaded files share one logical table keyed by
//! `(partition, sort)` composite keys; file payloads live in an object store
//! that clients talk to directly via presigned URLs. The library exposes the
//! repositories, store adapters, and HTTP surface; `main.rs` only wires
//! concrete AWS-backed implementations into them.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
