//! Service layer: store adapters and the project/file repositories.
//!
//! Stores are trait objects injected at process start; repositories hold
//! `Arc` handles and carry no other state, so cloning them is cheap and every
//! request can use them concurrently without locks.

pub mod file_service;
pub mod metadata_store;
pub mod object_store;
pub mod project_service;
