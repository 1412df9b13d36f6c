// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_enabled() -> bool {
    true
}

/// One syndication feed as listed by the source registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub language: String, // e.g. "zh-TW", "en"
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Item parsed from a feed; lives for one run only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: String,
    pub link: String,
    pub published_at: Option<u64>, // unix seconds
    pub excerpt: String,
    pub raw_content: Option<String>,
    pub source_name: String,
    pub source_language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedArticle {
    pub canonical_url: String,
    pub main_image_url: Option<String>,
    /// Clean `<h*>/<p>/<ul>/<ol>/<blockquote>/<img>` markup.
    pub structured_content: String,
    /// Plain-text projection of `structured_content`, capped for prompting.
    pub plain_text_excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub summary: String,
    pub region: String,
    pub tag: String,
    pub tag_variant: String,
    pub translated_title: Option<String>,
    pub translated_body: Option<String>,
}

/// Persisted row. Field names on the wire follow the `news` table columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsRecord {
    pub title: String,
    #[serde(rename = "source")]
    pub source_url: String,
    #[serde(rename = "source_name")]
    pub source_display_name: String,
    #[serde(rename = "date")]
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub region: String,
    pub tag: String,
    pub tag_variant: String,
    #[serde(rename = "full_content")]
    pub content_markup: String,
    #[serde(rename = "image")]
    pub image_url: Option<String>,
}

/// Per-record line of a successful run result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSummary {
    pub title: String,
    pub source: String,
    pub tag: String,
    pub has_image: bool,
    pub has_content: bool,
}

impl From<&NewsRecord> for ItemSummary {
    fn from(r: &NewsRecord) -> Self {
        Self {
            title: r.title.clone(),
            source: r.source_url.clone(),
            tag: r.tag.clone(),
            has_image: r.image_url.is_some(),
            has_content: !r.content_markup.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStats {
    pub sources: usize,
    pub failed_sources: usize,
    pub fetched: usize,
    pub fresh: usize,
    pub attempted: usize,
    pub persisted: usize,
    /// Drop counts keyed by `IngestError::kind`.
    pub dropped: BTreeMap<String, usize>,
}

impl RunStats {
    pub(crate) fn record_drop(&mut self, kind: &str) {
        *self.dropped.entry(kind.to_string()).or_default() += 1;
    }

    pub fn dropped_for(&self, kind: &str) -> usize {
        self.dropped.get(kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub success: bool,
    pub processed: usize,
    pub items: Vec<ItemSummary>,
    pub stats: RunStats,
}

/// Structured outcome of a run that did not fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed(RunReport),
    NoNewItems { message: String, stats: RunStats },
}

impl RunOutcome {
    pub fn processed(&self) -> usize {
        match self {
            Self::Completed(r) => r.processed,
            Self::NoNewItems { .. } => 0,
        }
    }

    pub fn stats(&self) -> &RunStats {
        match self {
            Self::Completed(r) => &r.stats,
            Self::NoNewItems { stats, .. } => stats,
        }
    }
}
