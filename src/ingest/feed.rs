// src/ingest/feed.rs
//! Feed fetcher: RSS 2.0 / Atom retrieval and parsing with per-source isolation.

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime, UtcOffset,
};

use crate::error::IngestError;
use crate::ingest::types::{FeedSource, RawFeedItem};

pub struct FeedFetcher {
    client: reqwest::Client,
    concurrency: usize,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn fetch_source(&self, source: &FeedSource) -> Result<Vec<RawFeedItem>, IngestError> {
        self.fetch_inner(source)
            .await
            .map_err(|e| IngestError::SourceFetch {
                source_name: source.name.clone(),
                reason: format!("{e:#}"),
            })
    }

    async fn fetch_inner(&self, source: &FeedSource) -> Result<Vec<RawFeedItem>> {
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("GET {}", source.url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("feed returned {status}");
        }
        let body = resp.text().await.context("feed body")?;
        parse_feed(&body, source)
    }

    /// Fetch every source with bounded parallelism. Items come back in source
    /// order; failed sources are logged, counted and returned separately.
    pub async fn fetch_all(&self, sources: &[FeedSource]) -> (Vec<RawFeedItem>, Vec<IngestError>) {
        let futs: Vec<_> = sources
            .iter()
            .map(|s| async move { (s, self.fetch_source(s).await) })
            .collect();
        let results: Vec<_> = stream::iter(futs).buffered(self.concurrency).collect().await;

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for (source, res) in results {
            match res {
                Ok(mut v) => {
                    tracing::debug!(source = %source.name, items = v.len(), "feed parsed");
                    items.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(error = %e, source = %source.name, "feed source skipped");
                    counter!("ingest_source_errors_total").increment(1);
                    errors.push(e);
                }
            }
        }
        (items, errors)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Date,
    Updated,
    Excerpt,
    Content,
}

#[derive(Default)]
struct Draft {
    title: String,
    link: String,
    href: Option<String>,
    date: String,
    updated: String,
    excerpt: String,
    content: String,
}

impl Draft {
    fn push(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Date => &mut self.date,
            Field::Updated => &mut self.updated,
            Field::Excerpt => &mut self.excerpt,
            Field::Content => &mut self.content,
        };
        slot.push_str(text);
    }

    fn finish(self, source: &FeedSource) -> Option<RawFeedItem> {
        let title = crate::ingest::normalize_text(&self.title);
        let link = self
            .href
            .unwrap_or(self.link)
            .trim()
            .to_string();
        if title.is_empty() || link.is_empty() {
            return None;
        }
        let content = self.content.trim();
        // Atom entries may carry both; the publication date wins.
        let date = match self.date.trim() {
            "" => self.updated.trim(),
            d => d,
        };
        Some(RawFeedItem {
            title,
            link,
            published_at: parse_feed_date(date),
            excerpt: self.excerpt.trim().to_string(),
            raw_content: (!content.is_empty()).then(|| content.to_string()),
            source_name: source.name.clone(),
            source_language: source.language.clone(),
        })
    }
}

fn item_field(qname: &[u8]) -> Option<Field> {
    match qname {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"dc:date" => Some(Field::Date),
        b"updated" => Some(Field::Updated),
        b"description" | b"summary" => Some(Field::Excerpt),
        b"content:encoded" | b"content" => Some(Field::Content),
        _ => None,
    }
}

/// Atom `<link href rel>`: only alternate (or rel-less) links point at the article.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"rel" => {
                rel_ok = attr
                    .unescape_value()
                    .map(|v| v.as_ref() == "alternate")
                    .unwrap_or(false)
            }
            _ => {}
        }
    }
    href.filter(|h| rel_ok && !h.trim().is_empty())
}

/// Re-serialize a start or empty tag nested inside `<content>` (Atom xhtml).
fn tag_markup(e: &BytesStart<'_>, empty: bool) -> String {
    let inner = String::from_utf8_lossy(e);
    if empty {
        format!("<{inner}/>")
    } else {
        format!("<{inner}>")
    }
}

/// Parse an RSS 2.0 or Atom document into items tagged with the source's name
/// and language. Items without a title or link are skipped.
pub fn parse_feed(xml: &str, source: &FeedSource) -> Result<Vec<RawFeedItem>> {
    let t0 = std::time::Instant::now();
    let cleaned = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut saw_root = false;
    let mut draft: Option<Draft> = None;
    // (field, nesting depth inside the field element)
    let mut field: Option<(Field, usize)> = None;

    loop {
        let ev = reader
            .read_event()
            .with_context(|| format!("parsing feed xml at byte {}", reader.buffer_position()))?;
        match ev {
            Event::Start(e) => {
                let name = e.name();
                let qname = name.as_ref();
                if matches!(qname, b"rss" | b"feed" | b"rdf:RDF") {
                    saw_root = true;
                }
                if let Some((f, depth)) = field.as_mut() {
                    *depth += 1;
                    if let (Field::Content, Some(d)) = (*f, draft.as_mut()) {
                        d.push(Field::Content, &tag_markup(&e, false));
                    }
                    continue;
                }
                let Some(d) = draft.as_mut() else {
                    if matches!(qname, b"item" | b"entry") {
                        draft = Some(Draft::default());
                    }
                    continue;
                };
                if qname == b"link" && d.href.is_none() {
                    d.href = atom_href(&e);
                }
                if let Some(f) = item_field(qname) {
                    field = Some((f, 0));
                }
            }
            Event::Empty(e) => match (draft.as_mut(), field) {
                (Some(d), None) => {
                    if e.name().as_ref() == b"link" && d.href.is_none() {
                        d.href = atom_href(&e);
                    }
                }
                (Some(d), Some((Field::Content, _))) => {
                    d.push(Field::Content, &tag_markup(&e, true));
                }
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(d), Some((f, depth))) = (draft.as_mut(), field) {
                    // Text inside nested xhtml markup stays escaped.
                    let text = if f == Field::Content && depth > 0 {
                        String::from_utf8_lossy(&t).into_owned()
                    } else {
                        match t.unescape() {
                            Ok(s) => s.into_owned(),
                            Err(_) => String::from_utf8_lossy(&t).into_owned(),
                        }
                    };
                    d.push(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(d), Some((f, _))) = (draft.as_mut(), field) {
                    d.push(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                if let Some((f, depth)) = field.as_mut() {
                    if *depth > 0 {
                        *depth -= 1;
                        if let (Field::Content, Some(d)) = (*f, draft.as_mut()) {
                            let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                            d.push(Field::Content, &format!("</{name}>"));
                        }
                    } else {
                        field = None;
                    }
                    continue;
                }
                if matches!(e.name().as_ref(), b"item" | b"entry") {
                    if let Some(item) = draft.take().and_then(|d| d.finish(source)) {
                        out.push(item);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        bail!("document is neither RSS nor Atom");
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_items_parsed_total").increment(out.len() as u64);
    Ok(out)
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) to unix seconds; `None` when unknown.
pub fn parse_feed_date(ts: &str) -> Option<u64> {
    if ts.is_empty() {
        return None;
    }
    let ts = match ts.strip_suffix(" GMT").or_else(|| ts.strip_suffix(" UTC")) {
        Some(head) => format!("{head} +0000"),
        None => ts.to_string(),
    };
    OffsetDateTime::parse(&ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(&ts, &Rfc3339))
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

/// Replace HTML-only entities that are not legal in XML.
pub fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&copy;", "(c)")
}
