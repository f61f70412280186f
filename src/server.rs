use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::LazyLock;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::routes;
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Health probes stay reachable without a token.
    let public_routes = Router::new().route("/health", get(routes::health::health));

    let protected_routes = Router::new()
        .route("/shutdown", post(routes::health::shutdown))
        // QA record management
        .route("/api/records", get(routes::records::list_records))
        .route("/api/records", post(routes::records::create_record))
        .route("/api/records/{index}", get(routes::records::get_record))
        .route("/api/records/{index}", put(routes::records::update_record))
        .route("/api/records/{index}", delete(routes::records::delete_record))
        // Retrieval
        .route("/api/search", post(routes::search::search))
        .route("/api/refresh", post(routes::search::refresh))
        .route("/api/index/status", get(routes::search::index_status))
        .layer(axum::middleware::from_fn(require_bearer_token));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Gate the API behind `Authorization: Bearer <FAQ_AUTH_TOKEN>`. Leaving the
/// env var unset or empty disables the check (local development).
async fn require_bearer_token(req: Request, next: Next) -> Response {
    static EXPECTED: LazyLock<Option<String>> = LazyLock::new(|| {
        std::env::var("FAQ_AUTH_TOKEN").ok().filter(|t| !t.is_empty())
    });

    let Some(expected) = EXPECTED.as_ref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));

    match presented {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => {
            tracing::warn!("rejecting request: bearer token does not match");
            unauthorized()
        }
        None => {
            tracing::warn!("rejecting request: no bearer token presented");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized", "status": 401})),
    )
        .into_response()
}
