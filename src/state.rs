use crate::config::AppConfig;
use crate::corpus::CorpusStore;
use crate::embedder::EmbeddingClient;
use crate::error::AppResult;
use crate::indexer::IndexManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub corpus: Arc<CorpusStore>,
    pub index: Arc<IndexManager>,
    pub started_at: Instant,
    /// Signalled by the shutdown endpoint; main selects on it next to the
    /// process signals.
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let data_dir = std::path::PathBuf::from(&config.data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(crate::error::AppError::Io)?;

        let api_key = std::env::var("FAQ_EMBED_API_KEY")
            .map_err(|_| anyhow::anyhow!("FAQ_EMBED_API_KEY is not set"))?;

        let corpus = Arc::new(CorpusStore::new(&config.corpus_path));
        let embedder = EmbeddingClient::new(
            &config.embed_endpoint,
            &api_key,
            &config.embed_model,
            config.embed_dimensions,
            Duration::from_secs(config.embed_timeout_secs),
        );
        let index = Arc::new(IndexManager::new(&config, corpus.clone(), embedder));

        Ok(Self {
            config,
            corpus,
            index,
            started_at: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        })
    }
}
