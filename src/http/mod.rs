/// HTTP interface
///
/// This module handles:
/// - Thin proxies to the image-edit and shot-search services (edit_image.rs, search.rs)
/// - Saving uploads into the public directory (upload.rs)
/// - Project, shot and preset management over the library (projects.rs, presets.rs)
/// - JSON error responses (error.rs) and multipart parsing (form.rs)

pub mod edit_image;
pub mod error;
pub mod form;
pub mod presets;
pub mod projects;
pub mod search;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::ShotCatalog;
use crate::render::FilterRenderer;
use crate::state::{KeyValueStore, Library};
use crate::upstream::{ImageEditor, RetryPolicy, SemanticSearch};

pub use error::ApiError;

/// The library behind a single-writer lock
pub type SharedLibrary = Arc<Mutex<Library<Box<dyn KeyValueStore>>>>;

#[derive(Clone)]
pub struct AppState {
    pub library: SharedLibrary,
    pub renderer: Arc<dyn FilterRenderer>,
    /// Absent when no image-edit service is configured
    pub editor: Option<Arc<dyn ImageEditor>>,
    /// Absent when no semantic search service is configured
    pub search: Option<Arc<dyn SemanticSearch>>,
    pub catalog: Arc<ShotCatalog>,
    pub public_dir: PathBuf,
    pub retry: RetryPolicy,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/edit-image", post(edit_image::edit_image))
        .route("/api/search", post(search::search))
        .route("/api/upload", post(upload::upload))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/api/projects/active", put(projects::set_active_project))
        .route(
            "/api/projects/:id",
            patch(projects::rename_project).delete(projects::delete_project),
        )
        .route(
            "/api/projects/:id/shots",
            get(projects::list_shots).post(projects::add_shot),
        )
        .route(
            "/api/projects/:id/shots/:shot_id",
            patch(projects::update_shot).delete(projects::remove_shot),
        )
        .route(
            "/api/projects/:id/shots/:shot_id/filters",
            put(projects::set_shot_filters),
        )
        .route("/api/shots/commit", post(projects::commit_shot))
        .route("/api/shots/prune", post(projects::prune_shots))
        .route(
            "/api/presets",
            get(presets::list_presets).post(presets::save_preset),
        )
        .route("/api/presets/:id", axum::routing::delete(presets::delete_preset))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
