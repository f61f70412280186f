use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Record not found at index {0}")]
    RecordNotFound(usize),

    #[error("Vector cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Cached vectors are {cached}-dimensional but the embedder declares {declared}")]
    DimensionMismatch { cached: usize, declared: usize },

    #[error("Embedding transport failure: {0}")]
    EmbedTransport(String),

    #[error("Embedding request rejected: {0}")]
    EmbedRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::CorpusUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::CacheCorrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::DimensionMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::EmbedTransport(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::EmbedRejected(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Serde(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
