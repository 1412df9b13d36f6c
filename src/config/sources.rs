// src/config/sources.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedSource;
use crate::store::SourceRegistry;

pub const ENV_SOURCES_PATH: &str = "NEWS_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<FeedSource>,
}

/// Source list kept in a local file: TOML `[[sources]]` tables or a JSON array.
/// Re-read on every call so edits apply to the next run.
#[derive(Debug, Clone)]
pub struct FileSourceRegistry {
    path: PathBuf,
}

impl FileSourceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$NEWS_SOURCES_PATH`, else `config/sources.toml`.
    pub fn from_env_or_default() -> Self {
        let path = std::env::var(ENV_SOURCES_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOURCES_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<FeedSource>> {
    if hint_ext == "json" || s.trim_start().starts_with('[') {
        return serde_json::from_str::<Vec<FeedSource>>(s).context("parsing sources json");
    }
    toml::from_str::<SourcesFile>(s)
        .map(|f| f.sources)
        .map_err(|e| anyhow!("unsupported sources format: {e}"))
}

#[async_trait]
impl SourceRegistry for FileSourceRegistry {
    async fn enabled_sources(&self) -> Result<Vec<FeedSource>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading sources from {}", self.path.display()))?;
        let ext = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let all = parse_sources(&content, &ext)?;
        Ok(all.into_iter().filter(|s| s.enabled).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_tables_default_to_enabled() {
        let toml = r#"
[[sources]]
name = "能源報"
url = "https://energy.test/rss"
language = "zh-TW"

[[sources]]
name = "PV Magazine"
url = "https://pv.test/feed"
language = "en"
enabled = false
"#;
        let v = parse_sources(toml, "toml").unwrap();
        assert_eq!(v.len(), 2);
        assert!(v[0].enabled);
        assert!(!v[1].enabled);
    }

    #[tokio::test]
    async fn file_registry_filters_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sources.json");
        fs::write(
            &p,
            r#"[{"name":"A","url":"https://a.test/rss","language":"en"},
                {"name":"B","url":"https://b.test/rss","language":"en","enabled":false}]"#,
        )
        .unwrap();
        let reg = FileSourceRegistry::new(&p);
        let got = reg.enabled_sources().await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "A");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let reg = FileSourceRegistry::new("/nonexistent/sources.toml");
        assert!(reg.enabled_sources().await.is_err());
    }
}
