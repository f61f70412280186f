use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness plus a quick index snapshot, so probes can tell "process up"
/// apart from "index ready to answer queries".
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = state.index.status();
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "index": {
            "initialized": status.initialized,
            "reconciling": status.reconciling,
            "total_chunks": status.total_chunks,
        },
    }))
}

/// Ask the process to exit cleanly. Supervisors without signal access post
/// here instead of sending SIGTERM.
pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    tracing::info!("shutdown requested over HTTP");
    state.shutdown.notify_one();
    Json(json!({ "status": "shutting_down" }))
}
