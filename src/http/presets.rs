use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::state::edit::FilterValues;

#[derive(Deserialize)]
pub struct NewPreset {
    pub name: String,
    #[serde(flatten)]
    pub filters: FilterValues,
}

pub async fn list_presets(State(state): State<AppState>) -> Json<Value> {
    let library = state.library.lock().await;
    Json(json!({ "presets": library.presets() }))
}

pub async fn save_preset(
    State(state): State<AppState>,
    Json(body): Json<NewPreset>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let preset = state
        .library
        .lock()
        .await
        .save_preset(&body.name, body.filters)?;
    Ok((StatusCode::CREATED, Json(json!({ "preset": preset }))))
}

pub async fn delete_preset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.library.lock().await.delete_preset(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
