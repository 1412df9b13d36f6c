// src/ingest/mod.rs
pub mod config;
pub mod dedup;
pub mod feed;
pub mod gate;
pub mod http;
pub mod resolve;
pub mod scrape;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use url::Url;

use crate::analyze::ai_adapter::DynLlmClient;
use crate::analyze::{classify, is_foreign, needs_translation, translate_body};
use crate::error::IngestError;
use crate::ingest::config::{ContentMode, PipelineConfig};
use crate::ingest::dedup::{exact_key_filter, NearDuplicateFilter, TITLE_WINDOW_DAYS};
use crate::ingest::feed::FeedFetcher;
use crate::ingest::gate::content_gate;
use crate::ingest::http::HttpClients;
use crate::ingest::resolve::{needs_resolution, resolve_link};
use crate::ingest::scrape::{article_from_feed, ArticleScraper};
use crate::ingest::types::{
    ClassificationResult, FeedSource, ItemSummary, NewsRecord, RawFeedItem, RunOutcome, RunReport,
    RunStats, ScrapedArticle,
};
use crate::store::{NewsStore, SourceRegistry};

pub const NO_SOURCES_MSG: &str = "No enabled RSS sources found";
pub const NO_ITEMS_MSG: &str = "No items fetched from any source";
pub const NO_NEW_ITEMS_MSG: &str = "No new unique items to process.";

/// Drop reason for links already persisted or repeated within the run.
pub const EXACT_KEY_DROP: &str = "exact_key";
/// Drop reason for titles matching the persisted window or an earlier record.
pub const NEAR_DUPLICATE_DROP: &str = "near_duplicate";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingest runs started.");
        describe_counter!("ingest_items_parsed_total", "Items parsed from feeds.");
        describe_counter!("ingest_source_errors_total", "Feed fetch/parse failures.");
        describe_counter!(
            "ingest_items_fresh_total",
            "Items left after the exact-key gate."
        );
        describe_counter!(
            "ingest_items_dropped_total",
            "Items dropped, labelled by reason."
        );
        describe_counter!(
            "ingest_classification_fallbacks_total",
            "Classifications that used at least one default field."
        );
        describe_counter!(
            "ingest_translation_failures_total",
            "Translations that failed; original content kept."
        );
        describe_counter!("ingest_records_persisted_total", "Records upserted.");
        describe_counter!("ingest_run_failures_total", "Runs aborted by a fatal error.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("ingest_run_ms", "Whole run time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }
    out
}

/// Publisher names for article hosts. More specific hosts come first.
const KNOWN_HOSTS: &[(&str, &str)] = &[
    ("technews.tw", "TechNews"),
    ("reccessary.com", "Reccessary"),
    ("netzero.cna.com.tw", "淨零碳排"),
    ("cna.com.tw", "中央社"),
    ("cleantechnica.com", "CleanTechnica"),
    ("pv-magazine.com", "PV Magazine"),
    ("windpowermonthly.com", "Wind Power"),
    ("energy-storage.news", "Energy Storage"),
    ("electrek.co", "Electrek"),
    ("carbonbrief.org", "Carbon Brief"),
    ("greenbiz.com", "GreenBiz"),
    ("cw.com.tw", "天下雜誌"),
    ("bnext.com.tw", "數位時代"),
    ("taipower.com.tw", "台電"),
    ("moeaboe.gov.tw", "能源局"),
    ("delta-foundation.org.tw", "台達基金會"),
    ("e-info.org.tw", "環境資訊"),
    ("udn.com", "聯合新聞網"),
    ("ltn.com.tw", "自由時報"),
];

/// Feed source name; when blank, the publisher name for the article host,
/// or the host itself without `www.`.
pub fn display_name(source_name: &str, article_url: &str) -> String {
    let name = source_name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    let Some(host) = Url::parse(article_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
    else {
        return String::new();
    };
    KNOWN_HOSTS
        .iter()
        .find(|(known, _)| {
            host == *known
                || host
                    .strip_suffix(known)
                    .is_some_and(|head| head.ends_with('.'))
        })
        .map(|(_, publisher)| publisher.to_string())
        .unwrap_or(host)
}

/// Assemble the persisted row. Foreign items publish the translated title and,
/// when available, the translated body.
pub fn build_record(
    item: &RawFeedItem,
    article: ScrapedArticle,
    cls: ClassificationResult,
    foreign: bool,
    run_started: DateTime<Utc>,
) -> NewsRecord {
    let title = match (foreign, cls.translated_title) {
        (true, Some(t)) => t,
        _ => item.title.clone(),
    };
    let published_at = item
        .published_at
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(run_started);
    NewsRecord {
        title,
        source_display_name: display_name(&item.source_name, &article.canonical_url),
        source_url: article.canonical_url,
        published_at,
        summary: cls.summary,
        region: cls.region,
        tag: cls.tag,
        tag_variant: cls.tag_variant,
        content_markup: cls.translated_body.unwrap_or(article.structured_content),
        image_url: article.main_image_url,
    }
}

/// The whole ingest pipeline for one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    http: HttpClients,
    fetcher: FeedFetcher,
    scraper: ArticleScraper,
    store: Arc<dyn NewsStore>,
    llm: DynLlmClient,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn NewsStore>,
        llm: DynLlmClient,
    ) -> anyhow::Result<Self> {
        let config = config.sanitized();
        let http = HttpClients::from_config(&config)?;
        let fetcher = FeedFetcher::new(http.fetch.clone(), config.concurrency);
        let scraper = ArticleScraper::new(http.fetch.clone(), config.image_proxy_hosts.clone());
        Ok(Self {
            config,
            http,
            fetcher,
            scraper,
            store,
            llm,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve, scrape, gate, classify and translate one item.
    async fn process_item(
        &self,
        item: RawFeedItem,
        run_started: DateTime<Utc>,
    ) -> Result<NewsRecord, IngestError> {
        let cfg = &self.config;

        let target = if needs_resolution(&item.link, cfg.resolve, &cfg.aggregator_hosts) {
            resolve_link(&self.http.no_redirect, &item.link).await?
        } else {
            item.link.clone()
        };

        let article = match cfg.content {
            ContentMode::Scrape => self.scraper.scrape(&target).await?,
            ContentMode::Feed => article_from_feed(&item, &target, &cfg.image_proxy_hosts),
        };

        content_gate(&article, cfg.min_content_chars)?;

        let foreign = is_foreign(&item.source_language, &cfg.publish_language);
        let mut cls = classify(
            self.llm.as_ref(),
            &item.title,
            &article.plain_text_excerpt,
            foreign,
            &cfg.publish_language,
            &cfg.tags,
        )
        .await;

        if foreign && needs_translation(&article.plain_text_excerpt) {
            match translate_body(self.llm.as_ref(), &article.plain_text_excerpt, &cfg.publish_language).await {
                Ok(markup) => cls.translated_body = Some(markup),
                Err(e) => {
                    tracing::warn!(error = %e, url = %article.canonical_url, "translation failed; keeping original content");
                    counter!("ingest_translation_failures_total").increment(1);
                }
            }
        }

        Ok(build_record(&item, article, cls, foreign, run_started))
    }

    /// Run the pipeline over `sources`. Only registry, snapshot and
    /// persistence failures come back as `Err`.
    pub async fn run(&self, sources: &[FeedSource]) -> Result<RunOutcome, IngestError> {
        ensure_metrics_described();
        counter!("ingest_runs_total").increment(1);
        let t0 = std::time::Instant::now();
        let run_started = Utc::now();

        let result = self.run_inner(sources, run_started).await;

        histogram!("ingest_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("ingest_pipeline_last_run_ts").set(run_started.timestamp() as f64);
        if let Err(e) = &result {
            counter!("ingest_run_failures_total").increment(1);
            tracing::error!(target: "ingest", error = %e, kind = e.kind(), "ingest run failed");
        }
        result
    }

    async fn run_inner(
        &self,
        sources: &[FeedSource],
        run_started: DateTime<Utc>,
    ) -> Result<RunOutcome, IngestError> {
        let cfg = &self.config;
        let enabled: Vec<FeedSource> = sources.iter().filter(|s| s.enabled).cloned().collect();
        let mut stats = RunStats {
            sources: enabled.len(),
            ..RunStats::default()
        };

        if enabled.is_empty() {
            tracing::info!(target: "ingest", "no enabled sources");
            return Ok(no_new_items(NO_SOURCES_MSG, stats));
        }

        // Stage 2: fetch
        let (items, errors) = self.fetcher.fetch_all(&enabled).await;
        stats.failed_sources = errors.len();
        stats.fetched = items.len();
        if items.is_empty() {
            tracing::info!(target: "ingest", failed = stats.failed_sources, "no items fetched");
            return Ok(no_new_items(NO_ITEMS_MSG, stats));
        }

        // Stage 3: exact-key gate against the persisted key snapshot
        let mut links: Vec<String> = Vec::with_capacity(items.len());
        let mut seen_links: HashSet<&str> = HashSet::with_capacity(items.len());
        for it in &items {
            if seen_links.insert(it.link.as_str()) {
                links.push(it.link.clone());
            }
        }
        let known = self
            .store
            .existing_source_urls(&links)
            .await
            .map_err(IngestError::snapshot)?;
        let (fresh, dup_count) = exact_key_filter(items, &known);
        for _ in 0..dup_count {
            stats.record_drop(EXACT_KEY_DROP);
        }
        counter!("ingest_items_dropped_total", "reason" => EXACT_KEY_DROP).increment(dup_count as u64);
        counter!("ingest_items_fresh_total").increment(fresh.len() as u64);
        stats.fresh = fresh.len();
        if fresh.is_empty() {
            tracing::info!(target: "ingest", fetched = stats.fetched, "nothing new");
            return Ok(no_new_items(NO_NEW_ITEMS_MSG, stats));
        }

        // Persisted title window, read before any classification
        let since = run_started - Duration::days(TITLE_WINDOW_DAYS);
        let titles = self
            .store
            .titles_since(since)
            .await
            .map_err(IngestError::snapshot)?;
        let mut near_dups = NearDuplicateFilter::new(titles);

        // Republished stories (aggregator links never match a stored key) are
        // dropped on their feed title before they take a batch slot.
        let (candidates, known_titles) = near_dups.filter_known(fresh);
        for _ in 0..known_titles {
            stats.record_drop(NEAR_DUPLICATE_DROP);
        }
        counter!("ingest_items_dropped_total", "reason" => NEAR_DUPLICATE_DROP)
            .increment(known_titles as u64);
        if candidates.is_empty() {
            tracing::info!(target: "ingest", fresh = stats.fresh, "only known titles left");
            return Ok(no_new_items(NO_NEW_ITEMS_MSG, stats));
        }

        // Stages 4-7 per item, bounded parallelism, results in input order
        let batch: Vec<RawFeedItem> = candidates.into_iter().take(cfg.batch_size).collect();
        stats.attempted = batch.len();
        let futs: Vec<_> = batch
            .into_iter()
            .map(|item| self.process_item(item, run_started))
            .collect();
        let processed: Vec<Result<NewsRecord, IngestError>> =
            stream::iter(futs).buffered(cfg.concurrency).collect().await;

        // Stage 8: in-run canonical URL and near-duplicate checks
        let mut records: Vec<NewsRecord> = Vec::with_capacity(processed.len());
        let mut taken_urls: HashSet<String> = HashSet::new();
        for res in processed {
            let outcome = res.and_then(|record| {
                if taken_urls.contains(&record.source_url) {
                    return Err(IngestError::DuplicateUrl(record.source_url));
                }
                if let Some((matched, similarity)) = near_dups.check(&record.title) {
                    return Err(IngestError::NearDuplicate {
                        matched: matched.to_string(),
                        similarity,
                    });
                }
                Ok(record)
            });
            match outcome {
                Ok(record) => {
                    near_dups.remember(&record.title);
                    taken_urls.insert(record.source_url.clone());
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, reason = e.kind(), "item dropped");
                    counter!("ingest_items_dropped_total", "reason" => e.kind()).increment(1);
                    stats.record_drop(e.kind());
                }
            }
        }

        // Stage 9: single idempotent upsert
        if !records.is_empty() {
            self.store
                .upsert(&records)
                .await
                .map_err(|e| IngestError::persistence(records.len(), e))?;
        }
        stats.persisted = records.len();
        counter!("ingest_records_persisted_total").increment(records.len() as u64);

        tracing::info!(
            target: "ingest",
            fetched = stats.fetched,
            fresh = stats.fresh,
            attempted = stats.attempted,
            persisted = stats.persisted,
            "ingest run finished"
        );

        Ok(RunOutcome::Completed(RunReport {
            success: true,
            processed: records.len(),
            items: records.iter().map(ItemSummary::from).collect(),
            stats,
        }))
    }
}

fn no_new_items(message: &str, stats: RunStats) -> RunOutcome {
    RunOutcome::NoNewItems {
        message: message.to_string(),
        stats,
    }
}

/// Read the enabled sources and run the pipeline once.
pub async fn run_once(
    registry: &dyn SourceRegistry,
    pipeline: &Pipeline,
) -> Result<RunOutcome, IngestError> {
    let sources = registry
        .enabled_sources()
        .await
        .map_err(IngestError::registry)?;
    pipeline.run(&sources).await
}
