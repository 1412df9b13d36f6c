// src/ingest/scrape/mod.rs
//! Article scraper: fetch a resolved page and turn it into a `ScrapedArticle`.

pub mod extract;
pub mod image;

use anyhow::{bail, Context, Result};
use scraper::Html;
use url::Url;

use crate::error::IngestError;
use crate::ingest::types::{RawFeedItem, ScrapedArticle};

pub use extract::{plain_text_projection, structured_content, CONTAINER_STRATEGIES};
pub use image::representative_image;

/// Build the article from a parsed page. `page_url` is the post-redirect URL
/// used to resolve relative links; `canonical_url` is what gets persisted.
pub fn extract_article(
    html: &str,
    canonical_url: &str,
    page_url: Option<&Url>,
    proxy_hosts: &[String],
) -> ScrapedArticle {
    let doc = Html::parse_document(html);
    let markup = structured_content(&doc, page_url);
    ScrapedArticle {
        canonical_url: canonical_url.to_string(),
        main_image_url: representative_image(&doc, page_url, proxy_hosts),
        plain_text_excerpt: plain_text_projection(&markup),
        structured_content: markup,
    }
}

/// Article built from the feed's own content (falls back to the excerpt)
/// with the same extraction rules, no page fetch.
pub fn article_from_feed(item: &RawFeedItem, canonical_url: &str, proxy_hosts: &[String]) -> ScrapedArticle {
    let body = item
        .raw_content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(&item.excerpt);
    // Bare feed HTML rarely has an <article>; wrapping keeps the strategies meaningful.
    let wrapped = format!("<html><body><article>{body}</article></body></html>");
    let base = Url::parse(canonical_url).ok();
    extract_article(&wrapped, canonical_url, base.as_ref(), proxy_hosts)
}

pub struct ArticleScraper {
    client: reqwest::Client,
    proxy_hosts: Vec<String>,
}

impl ArticleScraper {
    pub fn new(client: reqwest::Client, proxy_hosts: Vec<String>) -> Self {
        Self {
            client,
            proxy_hosts,
        }
    }

    pub async fn scrape(&self, url: &str) -> Result<ScrapedArticle, IngestError> {
        let (body, final_url) = self.fetch_html(url).await.map_err(|e| IngestError::Scrape {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })?;
        Ok(extract_article(&body, url, Some(&final_url), &self.proxy_hosts))
    }

    async fn fetch_html(&self, url: &str) -> Result<(String, Url)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} for {url}");
        }
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        Ok((body, final_url))
    }
}
