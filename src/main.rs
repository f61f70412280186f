use anyhow::Result;
use faq_backend::{config, server, state};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let log_dir = std::env::var("FAQ_LOG_DIR").unwrap_or_else(|_| {
        dirs::data_local_dir()
            .map(|d| d.join("faq-backend").join("logs").to_string_lossy().to_string())
            .unwrap_or_else(|| ".faq-data/logs".to_string())
    });
    std::fs::create_dir_all(&log_dir).ok();

    // The guard flushes the file appender on drop; keep it for main's lifetime.
    let _log_guard = init_tracing(&log_dir);
    log_panics();

    let config = config::AppConfig::from_env();
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        corpus_path = %config.corpus_path,
        embed_model = %config.embed_model,
        embed_dimensions = config.embed_dimensions,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        log_dir = %log_dir,
        "FAQ backend starting"
    );

    let app_state = state::AppState::new(config).await?;

    // A missing or unparsable corpus is fatal here; once serving, the same
    // condition is surfaced per-request instead.
    app_state.corpus.read_all()?;

    let shutdown = app_state.shutdown.clone();
    let app = server::create_app(app_state.clone());

    // Bind and serve BEFORE the initial reconciliation so /health responds
    // immediately; embedding a cold corpus can take a while.
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("FAQ backend listening on {}", addr);

    let init_state = app_state.clone();
    tokio::spawn(async move {
        match init_state.index.ensure_initialized().await {
            Ok(()) => info!("Initial reconciliation complete"),
            Err(e) => error!("Initial reconciliation failed: {e}"),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("FAQ backend shutdown complete");
    Ok(())
}

/// Log to stdout and a daily-rotated file under `log_dir`, filtered by
/// `RUST_LOG` when set.
fn init_tracing(log_dir: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "faq_backend=info,tower_http=info".into());

    let (file_writer, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(log_dir, "faq-backend.log"),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .compact(),
        )
        .init();

    guard
}

/// Route panics through tracing before the default hook aborts, so they
/// land in the rotated log file even when stdout is detached.
fn log_panics() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        error!(%location, %message, "panicked");
        previous(info);
    }));
}

/// Resolve when any shutdown trigger fires: ctrl-c, SIGTERM (unix only),
/// or the HTTP shutdown endpoint.
async fn shutdown_signal(shutdown: Arc<Notify>) {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = shutdown.notified() => info!("shutdown endpoint hit, shutting down"),
    }
}
