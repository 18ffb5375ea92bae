//! Persistence for the tracker: models, schema and the SQLite store

mod impl_tracker_store;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use models::*;
pub use sqlite::{SqliteStore, SqliteStoreConfig};
pub use traits::TrackerStore;
