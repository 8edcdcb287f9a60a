//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`tasks`] - Task creation and status
//! - [`system`] - Health, banner, OpenAPI

mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` works
pub use system::*;
pub use tasks::*;
