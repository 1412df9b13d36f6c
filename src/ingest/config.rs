// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PATH: &str = "NEWS_INGEST_CONFIG_PATH";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// When to run a feed link through the redirect resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Only links whose host is one of `aggregator_hosts`.
    #[default]
    Auto,
    Always,
    Never,
}

/// Where the article body comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Fetch and scrape the article page.
    #[default]
    Scrape,
    /// Trust the content embedded in the feed item.
    Feed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max items fully processed per run.
    pub batch_size: usize,
    /// Items (and feeds) in flight at once.
    pub concurrency: usize,
    pub min_content_chars: usize,
    /// Language records are published in; other sources get translated.
    pub publish_language: String,
    pub resolve: ResolveMode,
    pub content: ContentMode,
    pub aggregator_hosts: Vec<String>,
    /// Image hosts that never represent the real article (aggregator proxies).
    pub image_proxy_hosts: Vec<String>,
    /// Closed set of coarse tags; the first one is the fallback.
    pub tags: Vec<String>,
    pub http_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            concurrency: 3,
            min_content_chars: crate::ingest::gate::DEFAULT_MIN_CONTENT_CHARS,
            publish_language: "zh-TW".to_string(),
            resolve: ResolveMode::Auto,
            content: ContentMode::Scrape,
            aggregator_hosts: vec!["news.google.com".to_string()],
            image_proxy_hosts: vec!["googleusercontent.com".to_string()],
            tags: vec!["再生能源".to_string(), "節能".to_string()],
            http_timeout_secs: 20,
            run_timeout_secs: 140,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Clamp nonsensical values instead of failing the run.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.batch_size = self.batch_size.max(1);
        self.concurrency = self.concurrency.clamp(1, 16);
        if self.publish_language.trim().is_empty() {
            self.publish_language = defaults.publish_language;
        }
        self.tags = clean_list(self.tags);
        if self.tags.is_empty() {
            self.tags = defaults.tags;
        }
        self.aggregator_hosts = clean_hosts(self.aggregator_hosts);
        self.image_proxy_hosts = clean_hosts(self.image_proxy_hosts);
        if self.http_timeout_secs == 0 {
            self.http_timeout_secs = defaults.http_timeout_secs;
        }
        if self.run_timeout_secs == 0 {
            self.run_timeout_secs = defaults.run_timeout_secs;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = defaults.user_agent;
        }
        self
    }
}

/// Load pipeline config from an explicit path. Supports TOML or JSON formats.
pub fn load_pipeline_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load pipeline config using env var + fallbacks:
/// 1) $NEWS_INGEST_CONFIG_PATH
/// 2) config/pipeline.toml
/// 3) config/pipeline.json
/// 4) built-in defaults
pub fn load_pipeline_config_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_pipeline_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/pipeline.toml");
    if toml_p.exists() {
        return load_pipeline_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/pipeline.json");
    if json_p.exists() {
        return load_pipeline_config_from(&json_p);
    }
    Ok(PipelineConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    if hint_ext == "json" {
        let cfg: PipelineConfig = serde_json::from_str(s).context("parsing pipeline json")?;
        return Ok(cfg.sanitized());
    }
    match toml::from_str::<PipelineConfig>(s) {
        Ok(cfg) => Ok(cfg.sanitized()),
        Err(toml_err) => serde_json::from_str::<PipelineConfig>(s)
            .map(PipelineConfig::sanitized)
            .map_err(|_| anyhow!("unsupported pipeline config format: {toml_err}")),
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn clean_hosts(items: Vec<String>) -> Vec<String> {
    clean_list(items.into_iter().map(|h| h.to_ascii_lowercase()).collect())
}
