use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use std::path::Path;

use super::error::ApiError;
use super::form::Form;
use super::AppState;

/// `POST /api/upload`: store the `file` part unmodified as
/// `<public_dir>/uploaded-<name>`
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::bad_request("Nothing was uploaded."))?;

    // Keep only the final path component
    let name = Path::new(&file.file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("Uploaded file has no usable name"))?;
    let filename = format!("uploaded-{name}");

    let io_error = |e: std::io::Error| ApiError::internal("Failed to save upload").with_details(e.to_string());
    tokio::fs::create_dir_all(&state.public_dir)
        .await
        .map_err(io_error)?;
    tokio::fs::write(state.public_dir.join(&filename), &file.bytes)
        .await
        .map_err(io_error)?;

    tracing::info!(%filename, bytes = file.bytes.len(), "upload saved");
    Ok(Json(json!({ "filename": filename })))
}
