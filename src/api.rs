// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::ingest::{run_once, Pipeline};
use crate::store::SourceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn SourceRegistry>,
    pub pipeline: Arc<Pipeline>,
    /// Wall-clock budget of one triggered run.
    pub run_timeout: Duration,
}

impl AppState {
    pub fn new(registry: Arc<dyn SourceRegistry>, pipeline: Arc<Pipeline>) -> Self {
        let run_timeout = Duration::from_secs(pipeline.config().run_timeout_secs);
        Self {
            registry,
            pipeline,
            run_timeout,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/fetch-news", post(fetch_news))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn fatal_response(error: String, detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "detail": detail })),
    )
        .into_response()
}

async fn fetch_news(State(state): State<AppState>) -> Response {
    let run = run_once(state.registry.as_ref(), state.pipeline.as_ref());
    match tokio::time::timeout(state.run_timeout, run).await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(e)) => fatal_response(e.to_string(), e.detail()),
        Err(_) => {
            tracing::error!(
                target: "ingest",
                budget_secs = state.run_timeout.as_secs(),
                "ingest run abandoned after exceeding its time budget"
            );
            fatal_response(
                format!(
                    "run exceeded its {}s budget and was abandoned",
                    state.run_timeout.as_secs()
                ),
                "the run was cancelled before its result was known".to_string(),
            )
        }
    }
}
