//! HTTP API for the tracker

pub mod context_handlers;
pub mod handlers;
pub mod project_handlers;
pub mod query;
pub mod record_handlers;
pub mod routes;
pub mod task_handlers;

pub use handlers::{AppError, ServerState, TrackerState};
pub use query::*;
pub use routes::create_router;
