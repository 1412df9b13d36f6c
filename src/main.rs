//! News ingestion service entrypoint.
//! Boots the Axum HTTP server: `POST /fetch-news` triggers one pipeline run,
//! `GET /health` and `GET /metrics` are for operations.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use news_ingest::ai_adapter::build_llm_client;
use news_ingest::config::{load_pipeline_config_default, FileSourceRegistry};
use news_ingest::metrics::Metrics;
use news_ingest::store::{InMemoryStore, NewsStore, SourceRegistry, SupabaseStore};
use news_ingest::{create_router, init_tracing, AppState, Pipeline};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = load_pipeline_config_default().context("loading pipeline config")?;
    let llm = build_llm_client();
    tracing::info!(provider = llm.provider_name(), "language model client ready");

    let (registry, store): (Arc<dyn SourceRegistry>, Arc<dyn NewsStore>) =
        match SupabaseStore::from_env().context("configuring managed store")? {
            Some(s) => {
                tracing::info!("using managed store for sources and news");
                let s = Arc::new(s);
                (s.clone() as Arc<dyn SourceRegistry>, s as Arc<dyn NewsStore>)
            }
            None => {
                let file = FileSourceRegistry::from_env_or_default();
                tracing::warn!(
                    sources = %file.path().display(),
                    "SUPABASE_URL not set; using file sources and an in-memory news store"
                );
                (
                    Arc::new(file) as Arc<dyn SourceRegistry>,
                    Arc::new(InMemoryStore::new()) as Arc<dyn NewsStore>,
                )
            }
        };

    let pipeline = Arc::new(Pipeline::new(config, store, llm).context("building pipeline")?);
    let state = AppState::new(registry, pipeline);

    let metrics = Metrics::init()?;
    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
