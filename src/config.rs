use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum allowed length for search queries (characters).
pub const MAX_SEARCH_QUERY_LENGTH: usize = 1000;

/// Default OpenAI-compatible embeddings endpoint.
pub const DEFAULT_EMBED_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    pub data_dir: String,
    pub corpus_path: String,
    pub embed_endpoint: String,
    pub embed_model: String,
    /// API key is read from the environment at client construction, never
    /// stored here, so serialized configs stay secret-free.
    pub embed_dimensions: usize,
    pub embed_timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub default_k: usize,
    pub max_k: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("FAQ_PORT").unwrap_or_else(|_| "9742".to_string());

        let data_dir = std::env::var("FAQ_DATA_DIR").unwrap_or_else(|_| {
            dirs::data_local_dir()
                .map(|d| d.join("faq-backend").to_string_lossy().to_string())
                .unwrap_or_else(|| ".faq-data".to_string())
        });

        let corpus_path = std::env::var("FAQ_CORPUS_PATH").unwrap_or_else(|_| {
            PathBuf::from(&data_dir)
                .join("corpus.json")
                .to_string_lossy()
                .to_string()
        });

        Self {
            listen_addr: format!("127.0.0.1:{}", port),
            data_dir,
            corpus_path,
            embed_endpoint: std::env::var("FAQ_EMBED_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_EMBED_ENDPOINT.to_string()),
            embed_model: std::env::var("FAQ_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embed_dimensions: std::env::var("FAQ_EMBED_DIMENSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1536),
            embed_timeout_secs: std::env::var("FAQ_EMBED_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            chunk_size: std::env::var("FAQ_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            chunk_overlap: std::env::var("FAQ_CHUNK_OVERLAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            default_k: std::env::var("FAQ_DEFAULT_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            max_k: std::env::var("FAQ_MAX_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("vector_cache.json")
    }

    pub fn record_fingerprints_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("record_fingerprints.json")
    }

    pub fn corpus_fingerprint_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("corpus_fingerprint.txt")
    }
}
