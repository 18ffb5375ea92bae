//! Test helper factories and state builders
//!
//! Every builder works against a fresh SQLite file inside the caller's
//! `TempDir`, so tests never share state.
#![allow(dead_code)]

use crate::api::{ServerState, TrackerState};
use crate::attachments::FsBlobStore;
use crate::store::models::*;
use crate::store::{SqliteStore, SqliteStoreConfig, TrackerStore};
use crate::tracker::models::*;
use crate::tracker::TrackerManager;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// State builders
// ============================================================================

/// Open a store on `tracker.db` inside `dir`
pub async fn test_store(dir: &TempDir) -> Arc<dyn TrackerStore> {
    let url = format!("sqlite://{}", dir.path().join("tracker.db").display());
    let store = SqliteStore::connect(&SqliteStoreConfig::new(url))
        .await
        .expect("open test store");
    Arc::new(store)
}

/// Tracker manager writing attachments under `dir/blobs`
pub async fn test_manager(dir: &TempDir) -> TrackerManager {
    TrackerManager::new(
        test_store(dir).await,
        Arc::new(FsBlobStore::new(dir.path().join("blobs"))),
        3,
    )
}

pub async fn test_state(dir: &TempDir) -> TrackerState {
    Arc::new(ServerState::new(Arc::new(test_manager(dir).await)))
}

pub async fn test_router(dir: &TempDir) -> axum::Router {
    crate::api::create_router(test_state(dir).await)
}

// ============================================================================
// Entity factories
// ============================================================================

pub fn project_request(name: &str) -> CreateProjectRequest {
    CreateProjectRequest {
        name: name.into(),
        parent_id: None,
        goal: None,
        direction: None,
        repository_path: None,
        status: None,
    }
}

pub fn milestone_request(project_id: uuid::Uuid, name: &str) -> CreateMilestoneRequest {
    CreateMilestoneRequest {
        project_id,
        name: name.into(),
        slug: None,
        description: None,
        start_date: None,
        due_date: None,
        status: None,
    }
}

pub async fn seed_project(store: &Arc<dyn TrackerStore>, name: &str) -> Project {
    store
        .create_project(&project_request(name))
        .await
        .expect("seed project")
}

/// A project named "Apollo" holding one milestone called `name`
pub async fn seed_milestone(store: &Arc<dyn TrackerStore>, name: &str) -> Milestone {
    let project = seed_project(store, "Apollo").await;
    store
        .create_milestone(&milestone_request(project.id, name))
        .await
        .expect("seed milestone")
}
