// src/error.rs
//! Failure taxonomy of an ingest run.
//!
//! Everything except `Registry`, `Snapshot` and `Persistence` is recovered
//! inside the run: the source or item is dropped (or a default substituted)
//! and the run continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed source {source_name} failed: {reason}")]
    SourceFetch { source_name: String, reason: String },

    #[error("could not resolve {link}: {reason}")]
    Resolve { link: String, reason: String },

    #[error("scraping {url} failed: {reason}")]
    Scrape { url: String, reason: String },

    #[error("content too short for {url} ({len} < {min} chars)")]
    ContentTooShort { url: String, len: usize, min: usize },

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("near-duplicate of \"{matched}\" (similarity {similarity:.2})")]
    NearDuplicate { matched: String, similarity: f32 },

    #[error("canonical url {0} already taken earlier in this run")]
    DuplicateUrl(String),

    #[error("failed to read feed sources: {message}")]
    Registry { message: String, detail: String },

    #[error("failed to read dedup snapshot: {message}")]
    Snapshot { message: String, detail: String },

    #[error("persisting {count} records failed: {message}")]
    Persistence {
        count: usize,
        message: String,
        detail: String,
    },
}

impl IngestError {
    /// Fatal errors abort the run and are reported to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Registry { .. } | Self::Snapshot { .. } | Self::Persistence { .. }
        )
    }

    /// Stable label used for drop statistics and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceFetch { .. } => "source_fetch",
            Self::Resolve { .. } => "resolve",
            Self::Scrape { .. } => "scrape",
            Self::ContentTooShort { .. } => "content_too_short",
            Self::Classification(_) => "classification",
            Self::Translation(_) => "translation",
            Self::NearDuplicate { .. } => "near_duplicate",
            Self::DuplicateUrl(_) => "duplicate_url",
            Self::Registry { .. } => "registry",
            Self::Snapshot { .. } => "snapshot",
            Self::Persistence { .. } => "persistence",
        }
    }

    /// Diagnostic detail for the run result. Falls back to the display text.
    pub fn detail(&self) -> String {
        match self {
            Self::Registry { detail, .. }
            | Self::Snapshot { detail, .. }
            | Self::Persistence { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn registry(err: anyhow::Error) -> Self {
        Self::Registry {
            message: err.to_string(),
            detail: format!("{err:?}"),
        }
    }

    pub(crate) fn snapshot(err: anyhow::Error) -> Self {
        Self::Snapshot {
            message: err.to_string(),
            detail: format!("{err:?}"),
        }
    }

    pub(crate) fn persistence(count: usize, err: anyhow::Error) -> Self {
        Self::Persistence {
            count,
            message: err.to_string(),
            detail: format!("{err:?}"),
        }
    }
}
