use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::corpus::QaRecord;
use crate::error::AppResult;
use crate::indexer::IndexManager;
use crate::state::AppState;

/// Spawn a background reconciliation after a corpus mutation. Passes
/// serialize inside the manager, so a burst of CRUD calls simply queues;
/// each later pass sees its predecessor's ledger and re-embeds only the
/// remaining delta.
pub fn spawn_background_reconcile(index: Arc<IndexManager>) {
    tokio::spawn(async move {
        if let Err(e) = index.refresh().await {
            tracing::error!("Reconciliation after corpus mutation failed: {e}");
        }
    });
}

pub async fn list_records(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let records = state.corpus.read_all()?;
    let listed: Vec<serde_json::Value> = records
        .iter()
        .enumerate()
        .map(|(index, r)| json!({ "index": index, "record": r }))
        .collect();
    Ok(Json(json!({ "count": listed.len(), "records": listed })))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> AppResult<Json<QaRecord>> {
    Ok(Json(state.corpus.get(index)?))
}

pub async fn create_record(
    State(state): State<AppState>,
    Json(record): Json<QaRecord>,
) -> AppResult<Json<serde_json::Value>> {
    let index = state.corpus.create(record)?;
    spawn_background_reconcile(state.index.clone());
    Ok(Json(json!({ "status": "created", "index": index })))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(record): Json<QaRecord>,
) -> AppResult<Json<serde_json::Value>> {
    state.corpus.update(index, record)?;
    spawn_background_reconcile(state.index.clone());
    Ok(Json(json!({ "status": "updated", "index": index })))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> AppResult<Json<serde_json::Value>> {
    let removed = state.corpus.delete(index)?;
    spawn_background_reconcile(state.index.clone());
    Ok(Json(json!({ "status": "deleted", "removed": removed })))
}
