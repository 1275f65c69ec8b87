//! tm_leverage: glossary + translation-memory matching and leverage scoring.
//! Library root: module wiring, logging setup and service startup.

pub mod config;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod repository;
pub mod server;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Config, LogFormat};
use matching::HintComposer;
use metrics::MetricsRegistry;
use repository::{Repository, SqliteRepository};
use server::AppState;

/// Install the global tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tm_leverage=debug,tower_http=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}

/// Build the shared application state around an already-open repository.
pub fn build_state(repo: Arc<dyn Repository>, config: &Config) -> Arc<AppState> {
    let metrics = Arc::new(MetricsRegistry::new());
    let composer = HintComposer::new(repo, config.matching.clone(), Arc::clone(&metrics));
    Arc::new(AppState { composer, metrics })
}

/// Open the repository named by `config` and serve HTTP until shutdown.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        db = %config.db_path.display(),
        policy = ?config.matching.policy,
        timeout_ms = config.matching.request_timeout.as_millis() as u64,
        "tm_leverage starting"
    );

    let db_path = config.db_path.clone();
    let pool_size = config.pool_size;
    let repo = tokio::task::spawn_blocking(move || SqliteRepository::open(&db_path, pool_size))
        .await??;

    let state = build_state(Arc::new(repo), &config);
    server::serve(state, config.bind_addr).await?;
    info!("tm_leverage stopped");
    Ok(())
}
