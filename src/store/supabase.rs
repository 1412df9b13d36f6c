// src/store/supabase.rs
//! Managed store over PostgREST (`rss_sources` and `news` tables).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashSet;
use std::time::Duration;

use super::{NewsStore, SourceRegistry};
use crate::ingest::types::{FeedSource, NewsRecord};

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Keys per `in.(...)` filter; keeps request lines well under proxy limits.
const KEY_CHUNK: usize = 40;

pub struct SupabaseStore {
    http: reqwest::Client,
    rest_base: String,
}

impl SupabaseStore {
    pub fn new(project_url: &str, service_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(service_key).context("service key is not a valid header")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .context("service key is not a valid header")?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building store http client")?;

        Ok(Self {
            http,
            rest_base: format!("{}/rest/v1", project_url.trim_end_matches('/')),
        })
    }

    /// `None` when the store env vars are not set.
    pub fn from_env() -> Result<Option<Self>> {
        let url = match std::env::var(ENV_URL) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };
        let key = std::env::var(ENV_KEY).map_err(|_| anyhow!("Missing {ENV_KEY} env var"))?;
        Self::new(&url, &key).map(Some)
    }

    async fn get_rows<T: DeserializeOwned + Send>(&self, path_and_query: &str) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.rest_base, path_and_query);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path_and_query}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("store returned {status} for {path_and_query}: {body}");
        }
        resp.json::<Vec<T>>()
            .await
            .with_context(|| format!("decoding rows of {path_and_query}"))
    }
}

/// PostgREST `in.(...)` list with every value double-quoted.
fn in_filter(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    url::form_urlencoded::byte_serialize(format!("in.({})", quoted.join(",")).as_bytes())
        .collect()
}

#[async_trait]
impl SourceRegistry for SupabaseStore {
    async fn enabled_sources(&self) -> Result<Vec<FeedSource>> {
        self.get_rows("rss_sources?select=name,url,language,enabled&enabled=eq.true")
            .await
    }
}

#[derive(Deserialize)]
struct SourceRow {
    source: String,
}

#[derive(Deserialize)]
struct TitleRow {
    title: String,
}

#[async_trait]
impl NewsStore for SupabaseStore {
    async fn existing_source_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let mut out = HashSet::new();
        for chunk in urls.chunks(KEY_CHUNK) {
            let q = format!("news?select=source&source={}", in_filter(chunk));
            let rows: Vec<SourceRow> = self.get_rows(&q).await?;
            out.extend(rows.into_iter().map(|r| r.source));
        }
        Ok(out)
    }

    async fn titles_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let ts = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let q = format!(
            "news?select=title&date=gte.{}",
            url::form_urlencoded::byte_serialize(ts.as_bytes()).collect::<String>()
        );
        let rows: Vec<TitleRow> = self.get_rows(&q).await?;
        Ok(rows.into_iter().map(|r| r.title).collect())
    }

    async fn upsert(&self, records: &[NewsRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let url = format!("{}/news?on_conflict=source", self.rest_base);
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(records)
            .send()
            .await
            .context("POST news upsert")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("upsert rejected with {status}: {body}");
        }
        Ok(())
    }
}
