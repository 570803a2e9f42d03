//! HTTP handlers. Thin by design: resolve the caller, hand off to a
//! repository, translate the outcome. No storage logic lives here.

pub mod file_handlers;
pub mod health_handlers;
pub mod project_handlers;
pub mod stats_handlers;
