//! Tracker domain: identity references, request types, status aggregation

pub mod identity;
pub mod manager;
pub mod models;
pub mod status;

pub use identity::{MilestoneRef, ProjectRef, TaskRef};
pub use manager::TrackerManager;
pub use models::*;
