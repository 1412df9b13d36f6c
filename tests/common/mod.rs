// tests/common/mod.rs
//
// Shared fixtures: an in-process web server standing in for feeds, article
// pages and aggregator redirects, plus pipeline builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

use news_ingest::ai_adapter::{DynLlmClient, MockClient};
use news_ingest::ingest::config::PipelineConfig;
use news_ingest::store::InMemoryStore;
use news_ingest::{FeedSource, Pipeline};

#[derive(Clone)]
pub enum Page {
    Xml(String),
    Html(String),
    /// 302 with this `Location` value (may be relative).
    Redirect(String),
    Status(u16),
    /// Sleep, then serve the inner page.
    Slow(Duration, Box<Page>),
}

#[derive(Clone, Default)]
struct FixtureState {
    pages: Arc<Mutex<HashMap<String, Page>>>,
    hits: Arc<Mutex<Vec<(String, String)>>>,
}

pub struct Fixture {
    pub base: String,
    state: FixtureState,
}

impl Fixture {
    pub async fn start() -> Self {
        let state = FixtureState::default();
        let app = Router::new().fallback(serve_page).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture server");
        let addr = listener.local_addr().expect("fixture addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fixture server");
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Register a page by path (query strings are ignored when matching).
    pub fn set(&self, path: &str, page: Page) {
        self.state
            .pages
            .lock()
            .unwrap()
            .insert(path.to_string(), page);
    }

    /// Number of requests (any method) seen for `path`.
    pub fn hits_for(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p == path)
            .count()
    }

    pub fn methods_for(&self, path: &str) -> Vec<String> {
        self.state
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p == path)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

async fn serve_page(State(state): State<FixtureState>, method: Method, uri: Uri) -> Response {
    let path = uri.path().to_string();
    state
        .hits
        .lock()
        .unwrap()
        .push((method.to_string(), path.clone()));
    let page = state.pages.lock().unwrap().get(&path).cloned();
    match page {
        Some(p) => render(p).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn render(page: Page) -> Response {
    let mut page = page;
    loop {
        match page {
            Page::Xml(body) => {
                return ([(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")], body)
                    .into_response()
            }
            Page::Html(body) => {
                return ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
            }
            Page::Redirect(location) => {
                return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            Page::Status(code) => {
                return StatusCode::from_u16(code)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response()
            }
            Page::Slow(delay, inner) => {
                tokio::time::sleep(delay).await;
                page = *inner;
            }
        }
    }
}

// ---- document builders ----

pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub content: Option<String>,
}

pub fn entry(title: &str, link: &str) -> FeedEntry {
    FeedEntry {
        title: title.to_string(),
        link: link.to_string(),
        content: None,
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn rss(entries: &[FeedEntry]) -> String {
    let mut items = String::new();
    for e in entries {
        items.push_str("<item>");
        items.push_str(&format!("<title>{}</title>", xml_escape(&e.title)));
        items.push_str(&format!("<link>{}</link>", xml_escape(&e.link)));
        items.push_str("<description>teaser</description>");
        if let Some(c) = &e.content {
            items.push_str(&format!("<content:encoded><![CDATA[{c}]]></content:encoded>"));
        }
        items.push_str("</item>\n");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel><title>Fixture</title><link>http://fixture.test</link>
{items}</channel></rss>"#
    )
}

/// Article body well above the content gate.
pub fn article_body(topic: &str) -> String {
    let mut body = format!("<h1>{topic}</h1>");
    for i in 1..=4 {
        body.push_str(&format!(
            "<p>Paragraph {i} about {topic}: the grid operator reported steady progress on installations this quarter.</p>"
        ));
    }
    body
}

pub fn article_page(topic: &str) -> String {
    format!(
        r#"<html><head><meta property="og:image" content="/img/{slug}.jpg"></head>
<body><nav><p>Home / Energy / Renewables / Latest news</p></nav>
<article>{body}</article>
<footer><p>Copyright notice paragraph that must not be kept.</p></footer></body></html>"#,
        slug = topic.replace(' ', "-"),
        body = article_body(topic)
    )
}

pub fn short_page() -> String {
    "<html><body><article><p>Short</p></article></body></html>".to_string()
}

// ---- pipeline builders ----

pub fn source(name: &str, url: &str, language: &str) -> FeedSource {
    FeedSource {
        name: name.to_string(),
        url: url.to_string(),
        language: language.to_string(),
        enabled: true,
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        http_timeout_secs: 5,
        concurrency: 2,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(config: PipelineConfig, store: Arc<InMemoryStore>, llm: DynLlmClient) -> Pipeline {
    Pipeline::new(config, store, llm).expect("pipeline")
}

fn title_from_prompt(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Title: "))
        .unwrap_or_default()
        .to_string()
}

pub fn is_translation_prompt(prompt: &str) -> bool {
    prompt.starts_with("Translate the following")
}

/// Well-behaved model: valid classification JSON, translations prefixed with "譯：".
pub fn good_model() -> Arc<MockClient> {
    Arc::new(MockClient::new(|prompt| {
        if is_translation_prompt(prompt) {
            return Ok("譯：第一段\n\n譯：第二段".to_string());
        }
        let title = title_from_prompt(prompt);
        Ok(serde_json::json!({
            "translatedTitle": format!("譯：{title}"),
            "summary": format!("摘要：{title}"),
            "region": "Global",
            "tag": "節能",
            "tag_variant": "太陽能"
        })
        .to_string())
    }))
}

/// Small RAII helper to snapshot & restore env vars in each test.
pub struct EnvSnapshot {
    saved: Vec<(String, Option<String>)>,
}
impl EnvSnapshot {
    /// Provide a list of (KEY, Some(VALUE)) to set, or (KEY, None) to remove.
    pub fn set(pairs: &[(&str, Option<&str>)]) -> Self {
        let mut saved = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let key = k.to_string();
            let prev = env::var(k).ok();
            saved.push((key.clone(), prev));
            match v {
                Some(val) => env::set_var(&key, val),
                None => env::remove_var(&key),
            }
        }
        Self { saved }
    }
}
impl Drop for EnvSnapshot {
    fn drop(&mut self) {
        for (k, maybe_v) in self.saved.drain(..) {
            match maybe_v {
                Some(v) => env::set_var(&k, v),
                None => env::remove_var(&k),
            }
        }
    }
}
