// src/store/mod.rs
//! Seams to the managed data store: the read-only feed source list and the
//! `news` table.

pub mod memory;
pub mod supabase;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::ingest::types::{FeedSource, NewsRecord};

pub use memory::InMemoryStore;
pub use supabase::SupabaseStore;

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Enabled sources only.
    async fn enabled_sources(&self) -> Result<Vec<FeedSource>>;
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Subset of `urls` already persisted as `source`.
    async fn existing_source_urls(&self, urls: &[String]) -> Result<HashSet<String>>;

    /// Titles of records dated at or after `since`.
    async fn titles_since(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Batch upsert keyed by `source`; merges on conflict.
    async fn upsert(&self, records: &[NewsRecord]) -> Result<()>;
}
