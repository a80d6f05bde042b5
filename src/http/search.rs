use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use super::form::Form;
use super::AppState;
use crate::catalog::{serialize_subset, ShotQuery, MAX_SHOT_DATABASE_CHARS};
use crate::upstream::{SearchRequest, UpstreamError};

/// `POST /api/search`
///
/// Filters the catalog by shot size and year range. A description or
/// reference image hands the filtered subset to the semantic search
/// service, whose answer replaces the structured matches.
pub async fn search(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = Form::read(multipart).await?;

    let reference_image = form.text("referenceImage");
    let shot_size = form.text("shotSize");
    let start_year = form.text("startYear");
    let end_year = form.text("endYear");
    let description = form.text("shotDescription");

    if [reference_image, shot_size, start_year, end_year, description]
        .iter()
        .all(Option::is_none)
    {
        return Err(ApiError::bad_request(
            "Need to provide input for at least 1 search query field, but none provided",
        ));
    }

    let query = ShotQuery {
        shot_size: shot_size.map(str::to_string),
        start_year: parse_year("startYear", start_year)?,
        end_year: parse_year("endYear", end_year)?,
    };
    let matches = state.catalog.filter(&query);
    tracing::debug!(?query, matches = matches.len(), "catalog filtered");

    if reference_image.is_none() && description.is_none() {
        let ids: Vec<Value> = matches.iter().map(|shot| json!(shot.id)).collect();
        return Ok(Json(json!({ "matchingShotIds": ids })));
    }

    let search = state.search.as_ref().ok_or_else(|| {
        ApiError::upstream(
            "Failed to search shots",
            UpstreamError::Misconfigured("shot search service not configured".to_string()),
        )
    })?;

    let request = SearchRequest {
        shot_description: description.map(str::to_string),
        reference_image: reference_image.map(str::to_string),
        shot_database: serialize_subset(&matches, MAX_SHOT_DATABASE_CHARS)?,
    };
    let answer = search
        .search(&request)
        .await
        .map_err(|e| ApiError::upstream("Failed to search shots", e))?;

    let mut ids: Vec<Value> = Vec::with_capacity(answer.len());
    for id in answer {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(Json(json!({ "matchingShotIds": ids })))
}

fn parse_year(field: &str, value: Option<&str>) -> Result<Option<i64>, ApiError> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request(format!("{field} must be a year, got '{raw}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_requires_at_least_one_field() {
        let harness = Harness::new();
        let (status, _) = harness
            .send(multipart_request("/api/search", &[("shotSize", "")], None))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_structured_filter_uses_inclusive_years() {
        let harness = Harness::new();
        let (status, body) = harness
            .send(multipart_request(
                "/api/search",
                &[("startYear", "1994"), ("endYear", "2010")],
                None,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matchingShotIds"], json!([1, 2, 3]));

        let (_, body) = harness
            .send(multipart_request(
                "/api/search",
                &[("shotSize", "Close Up"), ("endYear", "1999")],
                None,
            ))
            .await;
        assert_eq!(body["matchingShotIds"], json!([0, 2]));
    }

    #[tokio::test]
    async fn test_non_numeric_year_is_rejected() {
        let harness = Harness::new();
        let (status, body) = harness
            .send(multipart_request("/api/search", &[("startYear", "the nineties")], None))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("startYear"));
    }

    #[tokio::test]
    async fn test_description_forwards_filtered_subset() {
        let mut harness = Harness::new();
        let search = Arc::new(StubSearch {
            answer: vec![json!(3), json!(1), json!(3)],
            ..StubSearch::default()
        });
        harness.state.search = Some(search.clone());

        let (status, body) = harness
            .send(multipart_request(
                "/api/search",
                &[("shotSize", "Wide"), ("shotDescription", "neon city at night")],
                None,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matchingShotIds"], json!([3, 1]));

        let sent = search.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.shot_description.as_deref(), Some("neon city at night"));
        assert_eq!(sent.reference_image, None);
        let subset: Vec<Value> = serde_json::from_str(&sent.shot_database).unwrap();
        let ids: Vec<i64> = subset.iter().map(|s| s["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
