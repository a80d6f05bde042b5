use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::ApiError;
use super::AppState;
use crate::state::data::ShotDetails;
use crate::state::edit::FilterValues;
use crate::state::library::resolve_stored_image;
use crate::state::{LibraryError, Saved, WriteReport};

#[derive(Deserialize)]
pub struct ProjectName {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProject {
    pub project_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShot {
    pub image_url: String,
    #[serde(flatten)]
    pub details: ShotDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitBody {
    /// Defaults to the active project
    pub project_id: Option<String>,
    pub original_ref: String,
    pub edited_image: Option<String>,
    #[serde(default)]
    pub filters: FilterValues,
}

/// Outcome fields shared by every write
fn report_fields(report: &WriteReport) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("outcome".to_string(), json!(report.outcome));
    fields.insert("message".to_string(), json!(report.outcome.message()));
    if let Some(err) = &report.shot_map_error {
        fields.insert("warning".to_string(), json!(err.to_string()));
    }
    fields
}

fn saved_body<T: Serialize>(field: &str, saved: Saved<T>) -> Result<Json<Value>, ApiError> {
    let mut body = report_fields(&saved.report);
    body.insert(field.to_string(), serde_json::to_value(saved.value)?);
    Ok(Json(Value::Object(body)))
}

pub async fn list_projects(State(state): State<AppState>) -> Json<Value> {
    let library = state.library.lock().await;
    Json(json!({
        "projects": library.projects(),
        "activeProjectId": library.active_project(),
    }))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<ProjectName>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let saved = state.library.lock().await.create_project(&body.name)?;
    Ok((StatusCode::CREATED, saved_body("project", saved)?))
}

pub async fn rename_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProjectName>,
) -> Result<Json<Value>, ApiError> {
    let saved = state.library.lock().await.rename_project(&id, &body.name)?;
    saved_body("project", saved)
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut library = state.library.lock().await;
    let report = library.delete_project(&id)?;

    let mut body = report_fields(&report);
    body.insert("activeProjectId".to_string(), json!(library.active_project()));
    Ok(Json(Value::Object(body)))
}

pub async fn set_active_project(
    State(state): State<AppState>,
    Json(body): Json<ActiveProject>,
) -> Result<Json<Value>, ApiError> {
    let mut library = state.library.lock().await;
    library.set_active_project(body.project_id.as_deref())?;
    Ok(Json(json!({ "activeProjectId": library.active_project() })))
}

pub async fn list_shots(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let library = state.library.lock().await;
    let project = library
        .project(&id)
        .ok_or_else(|| LibraryError::ProjectNotFound(id.clone()))?;
    Ok(Json(json!({
        "project": project,
        "shots": library.shots_for(&id),
    })))
}

pub async fn add_shot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewShot>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.image_url.is_empty() {
        return Err(ApiError::bad_request("imageUrl is required"));
    }
    let saved = state
        .library
        .lock()
        .await
        .add_shot(&id, &body.image_url, body.details)?;
    Ok((StatusCode::CREATED, saved_body("shot", saved)?))
}

pub async fn update_shot(
    State(state): State<AppState>,
    Path((id, shot_id)): Path<(String, String)>,
    Json(details): Json<ShotDetails>,
) -> Result<Json<Value>, ApiError> {
    let saved = state
        .library
        .lock()
        .await
        .update_shot_details(&id, &shot_id, details)?;
    saved_body("details", saved)
}

pub async fn remove_shot(
    State(state): State<AppState>,
    Path((id, shot_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let report = state.library.lock().await.remove_shot(&id, &shot_id)?;
    Ok(Json(Value::Object(report_fields(&report))))
}

pub async fn set_shot_filters(
    State(state): State<AppState>,
    Path((id, shot_id)): Path<(String, String)>,
    Json(filters): Json<FilterValues>,
) -> Result<Json<Value>, ApiError> {
    let saved = state
        .library
        .lock()
        .await
        .set_shot_filters(&id, &shot_id, filters)?;
    saved_body("shot", saved)
}

/// `POST /api/shots/commit`
///
/// The lock is released while the image renders and taken again for the
/// compaction and write.
pub async fn commit_shot(
    State(state): State<AppState>,
    Json(body): Json<CommitBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.original_ref.is_empty() {
        return Err(ApiError::bad_request("originalRef is required"));
    }

    let project_id = {
        let library = state.library.lock().await;
        let requested = body.project_id.as_deref().or(library.active_project());
        requested
            .and_then(|id| library.project(id))
            .map(|project| project.id.clone())
            .ok_or(LibraryError::NoProjectSelected)?
    };

    let stored_image = resolve_stored_image(
        state.renderer.as_ref(),
        &body.original_ref,
        body.edited_image.as_deref(),
        &body.filters.clamped(),
    )
    .await;

    // The project may have been deleted while rendering
    let saved = state.library.lock().await.commit_resolved(
        Some(&project_id),
        &body.original_ref,
        stored_image,
    )?;
    tracing::info!(project = %project_id, shot = %saved.value.id, outcome = ?saved.report.outcome, "shot committed");
    Ok((StatusCode::CREATED, saved_body("shot", saved)?))
}

pub async fn prune_shots(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = state.library.lock().await.prune_orphaned_shots()?;
    Ok(Json(json!({ "removed": removed })))
}
