use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::search::{self, SearchQuery, SearchResponse};
use crate::state::AppState;

pub async fn search(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    if query.query.trim().is_empty() {
        return Err(crate::error::AppError::BadRequest(
            "Search query must not be empty".to_string(),
        ));
    }
    if query.query.len() > crate::config::MAX_SEARCH_QUERY_LENGTH {
        return Err(crate::error::AppError::BadRequest(format!(
            "Search query too long ({} chars). Maximum allowed is {}.",
            query.query.len(),
            crate::config::MAX_SEARCH_QUERY_LENGTH,
        )));
    }

    let k = search::clamp_k(
        query.k.unwrap_or(state.config.default_k),
        state.config.max_k,
    );

    let response = search::search(&state.index, &state.corpus, &query.query, k).await?;
    Ok(Json(response))
}

/// Force a reconciliation pass and report what it did.
pub async fn refresh(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let summary = state.index.refresh().await?;
    Ok(Json(serde_json::json!({
        "status": "reconciled",
        "summary": summary,
    })))
}

pub async fn index_status(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let status = state.index.status();
    Ok(Json(serde_json::to_value(status)?))
}
