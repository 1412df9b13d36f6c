// tests/api_http.rs
//
// HTTP-level tests for the public Router, driven via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /fetch-news (success, nothing new, fatal failure, time budget)
// - GET /metrics after a run

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use common::{article_page, entry, good_model, pipeline, rss, source, test_config, Fixture, Page};
use news_ingest::metrics::Metrics;
use news_ingest::store::InMemoryStore;
use news_ingest::{create_router, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

/// Fixture feed with one article, a store whose registry lists that feed,
/// and the router over both.
async fn setup() -> (Fixture, Arc<InMemoryStore>, AppState) {
    let fx = Fixture::start().await;
    fx.set("/story/1", Page::Html(article_page("solar farm opens")));
    fx.set(
        "/feed",
        Page::Xml(rss(&[entry("solar farm opens", &fx.url("/story/1"))])),
    );
    let store = Arc::new(InMemoryStore::with_sources(vec![source(
        "能源報",
        &fx.url("/feed"),
        "zh-TW",
    )]));
    let p = Arc::new(pipeline(test_config(), store.clone(), good_model()));
    let state = AppState::new(store.clone(), p);
    (fx, store, state)
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn json(bytes: &[u8]) -> Json {
    serde_json::from_slice(bytes).expect("json body")
}

#[tokio::test]
async fn health_returns_ok() {
    let (_fx, _store, state) = setup().await;
    let (status, body) = call(create_router(state), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn fetch_news_reports_processed_items() {
    let (_fx, store, state) = setup().await;
    let (status, body) = call(create_router(state), "POST", "/fetch-news").await;
    assert_eq!(status, StatusCode::OK);

    let v = json(&body);
    assert_eq!(v["success"], true);
    assert_eq!(v["processed"], 1);
    assert_eq!(v["items"][0]["title"], "solar farm opens");
    assert_eq!(v["items"][0]["has_image"], true);
    assert_eq!(v["stats"]["fetched"], 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn second_trigger_reports_nothing_new() {
    let (_fx, _store, state) = setup().await;
    let app = create_router(state);
    let (first, _) = call(app.clone(), "POST", "/fetch-news").await;
    assert_eq!(first, StatusCode::OK);

    let (status, body) = call(app, "POST", "/fetch-news").await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["message"], "No new unique items to process.");
    assert_eq!(v["stats"]["dropped"]["exact_key"], 1);
    assert!(v.get("success").is_none());
}

#[tokio::test]
async fn fatal_failure_returns_400_with_error_and_detail() {
    let (_fx, store, state) = setup().await;
    store.fail_upserts(true);
    let (status, body) = call(create_router(state), "POST", "/fetch-news").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let v = json(&body);
    let error = v["error"].as_str().expect("error string");
    let detail = v["detail"].as_str().expect("detail string");
    assert!(error.contains("persist"), "{error}");
    assert!(detail.contains("unique constraint"), "{detail}");
}

#[tokio::test]
async fn run_over_budget_is_abandoned() {
    let (fx, store, state) = setup().await;
    fx.set(
        "/feed",
        Page::Slow(
            Duration::from_secs(3),
            Box::new(Page::Xml(rss(&[entry("late story", &fx.url("/story/1"))]))),
        ),
    );
    let state = AppState {
        run_timeout: Duration::from_millis(200),
        ..state
    };
    let (status, body) = call(create_router(state), "POST", "/fetch-news").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v = json(&body);
    assert!(v["error"].as_str().unwrap().contains("budget"));
    assert!(v["detail"].is_string());
    assert!(store.is_empty());
}

#[tokio::test]
async fn metrics_endpoint_exposes_ingest_series() {
    let metrics = Metrics::init().expect("metrics init");
    let (_fx, _store, state) = setup().await;
    let app = create_router(state).merge(metrics.router());

    let (status, _) = call(app.clone(), "POST", "/fetch-news").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(app, "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("ingest_runs_total"), "{text}");
    assert!(text.contains("ingest_records_persisted_total"), "{text}");
}
