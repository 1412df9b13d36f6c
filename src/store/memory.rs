// src/store/memory.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{NewsStore, SourceRegistry};
use crate::ingest::types::{FeedSource, NewsRecord};

/// Process-local store for local runs and tests. Rows are keyed by `source`.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<String, NewsRecord>>,
    sources: Mutex<Vec<FeedSource>>,
    fail_reads: AtomicBool,
    fail_upsert: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<FeedSource>) -> Self {
        let s = Self::default();
        s.set_sources(sources);
        s
    }

    pub fn set_sources(&self, sources: Vec<FeedSource>) {
        if let Ok(mut g) = self.sources.lock() {
            *g = sources;
        }
    }

    /// Insert a row as if a previous run had persisted it.
    pub fn seed(&self, record: NewsRecord) {
        if let Ok(mut g) = self.rows.lock() {
            g.insert(record.source_url.clone(), record);
        }
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, on: bool) {
        self.fail_upsert.store(on, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<NewsRecord> {
        self.rows
            .lock()
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, source_url: &str) -> Option<NewsRecord> {
        self.rows.lock().ok()?.get(source_url).cloned()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("in-memory store: reads disabled"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceRegistry for InMemoryStore {
    async fn enabled_sources(&self) -> Result<Vec<FeedSource>> {
        self.check_reads()?;
        let g = self
            .sources
            .lock()
            .map_err(|_| anyhow!("source list lock poisoned"))?;
        Ok(g.iter().filter(|s| s.enabled).cloned().collect())
    }
}

#[async_trait]
impl NewsStore for InMemoryStore {
    async fn existing_source_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        self.check_reads()?;
        let g = self.rows.lock().map_err(|_| anyhow!("rows lock poisoned"))?;
        Ok(urls
            .iter()
            .filter(|u| g.contains_key(u.as_str()))
            .cloned()
            .collect())
    }

    async fn titles_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        self.check_reads()?;
        let g = self.rows.lock().map_err(|_| anyhow!("rows lock poisoned"))?;
        Ok(g.values()
            .filter(|r| r.published_at >= since)
            .map(|r| r.title.clone())
            .collect())
    }

    async fn upsert(&self, records: &[NewsRecord]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(anyhow!(
                "duplicate key value violates unique constraint \"news_source_key\""
            ));
        }
        let mut g = self.rows.lock().map_err(|_| anyhow!("rows lock poisoned"))?;
        for r in records {
            g.insert(r.source_url.clone(), r.clone());
        }
        Ok(())
    }
}
