use axum::{
    Json,
    extract::{Query, State},
    http::Uri,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::config::defaults::MAX_SEARCH_RESULTS;
use crate::ytm::models::SongSummary;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    query: Option<String>,
    /// Older clients send `q`.
    q: Option<String>,
}

pub async fn home() -> Json<Value> {
    Json(json!({
        "message": "Audify Backend Live",
        "status": "active",
    }))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<SongSummary>>> {
    let query = params
        .query
        .or(params.q)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing query"))?;

    let limit = state.search_limit.min(MAX_SEARCH_RESULTS);
    let tracks = state
        .catalog
        .search_songs(&query, limit)
        .await
        .map_err(|e| {
            tracing::error!(%query, error = ?e, "search failed");
            ApiError::internal(e.to_string())
        })?;

    tracing::info!(%query, results = tracks.len(), "search");
    Ok(Json(
        tracks.iter().take(limit).map(SongSummary::from).collect(),
    ))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
