// src/ingest/dedup.rs
//! Exact-key and near-duplicate filters.
//!
//! Exact keys are feed links compared against persisted `source` URLs and
//! against earlier items of the same run. Near-duplicates are judged on titles
//! with a token-set Dice coefficient:
//!
//! - lowercase, split on whitespace, drop tokens of 2 chars or fewer
//! - `2 * |set(A) ∩ set(B)| / (len(A) + len(B))` over the token lists
//! - 0 when either side has no tokens
//!
//! Threshold and window are fixed.

use std::collections::HashSet;

use crate::ingest::types::RawFeedItem;

pub const NEAR_DUPLICATE_THRESHOLD: f32 = 0.90;
pub const TITLE_WINDOW_DAYS: i64 = 30;

/// Drop items whose link is already persisted or appeared earlier in the run.
/// Returns (kept, dropped_count).
pub fn exact_key_filter(
    items: Vec<RawFeedItem>,
    known: &HashSet<String>,
) -> (Vec<RawFeedItem>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for it in items {
        if known.contains(&it.link) || !seen.insert(it.link.clone()) {
            dropped += 1;
            continue;
        }
        kept.push(it);
    }
    (kept, dropped)
}

pub fn title_tokens(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

fn dice(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let common = set_a.intersection(&set_b).count();
    (2 * common) as f32 / (a.len() + b.len()) as f32
}

pub fn title_similarity(a: &str, b: &str) -> f32 {
    dice(&title_tokens(a), &title_tokens(b))
}

#[derive(Debug, Clone)]
struct SeenTitle {
    title: String,
    tokens: Vec<String>,
}

impl SeenTitle {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            tokens: title_tokens(title),
        }
    }
}

/// Near-duplicate filter seeded with the persisted title window; accepted
/// titles of the run are remembered as they pass.
#[derive(Debug, Default)]
pub struct NearDuplicateFilter {
    seen: Vec<SeenTitle>,
}

impl NearDuplicateFilter {
    pub fn new<I, S>(persisted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            seen: persisted
                .into_iter()
                .map(|t| SeenTitle::new(t.as_ref()))
                .collect(),
        }
    }

    /// Best match at or above the threshold, if any.
    pub fn check(&self, title: &str) -> Option<(&str, f32)> {
        let tokens = title_tokens(title);
        self.seen
            .iter()
            .map(|s| (s.title.as_str(), dice(&tokens, &s.tokens)))
            .filter(|(_, sim)| *sim >= NEAR_DUPLICATE_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn remember(&mut self, title: &str) {
        self.seen.push(SeenTitle::new(title));
    }

    /// Drop items whose feed title already matches a known title. Runs before
    /// the batch cap so republished stories do not use up the run's slots.
    /// Returns (kept, dropped_count); kept titles are not remembered.
    pub fn filter_known(&self, items: Vec<RawFeedItem>) -> (Vec<RawFeedItem>, usize) {
        let mut kept = Vec::with_capacity(items.len());
        let mut dropped = 0usize;
        for it in items {
            if let Some((matched, similarity)) = self.check(&it.title) {
                tracing::debug!(title = %it.title, matched, similarity, "feed title already published");
                dropped += 1;
                continue;
            }
            kept.push(it);
        }
        (kept, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> RawFeedItem {
        RawFeedItem {
            title: "t".into(),
            link: link.into(),
            published_at: None,
            excerpt: String::new(),
            raw_content: None,
            source_name: "S".into(),
            source_language: "en".into(),
        }
    }

    #[test]
    fn exact_keys_drop_known_and_repeats() {
        let known: HashSet<String> = ["https://a.test/1".to_string()].into_iter().collect();
        let items = vec![
            item("https://a.test/1"),
            item("https://a.test/2"),
            item("https://a.test/2"),
            item("https://a.test/3"),
        ];
        let (kept, dropped) = exact_key_filter(items, &known);
        let links: Vec<_> = kept.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["https://a.test/2", "https://a.test/3"]);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn tokens_drop_short_words() {
        assert_eq!(
            title_tokens("Solar  PV in Taiwan to GROW"),
            vec!["solar", "taiwan", "grow"]
        );
    }

    #[test]
    fn identical_titles_are_blocked() {
        let f = NearDuplicateFilter::new(["Taipower launches solar tender for 2025"]);
        let (matched, sim) = f.check("taipower launches SOLAR tender for 2025").unwrap();
        assert_eq!(matched, "Taipower launches solar tender for 2025");
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn below_threshold_keeps_both() {
        // 10 vs 11 tokens, 9 shared: 18/21 = 0.857
        let a = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let b = "alpha bravo charlie delta echo foxtrot golf hotel india kilo lima";
        assert!(title_similarity(a, b) < NEAR_DUPLICATE_THRESHOLD);
        let mut f = NearDuplicateFilter::default();
        f.remember(a);
        assert!(f.check(b).is_none());
    }

    #[test]
    fn at_threshold_blocks_second() {
        // 10 vs 10 tokens, 9 shared: 18/20 = 0.90
        let a = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let b = "alpha bravo charlie delta echo foxtrot golf hotel india kilo";
        assert!((title_similarity(a, b) - 0.90).abs() < 1e-6);
        let mut f = NearDuplicateFilter::default();
        assert!(f.check(a).is_none());
        f.remember(a);
        assert!(f.check(b).is_some());
    }

    #[test]
    fn filter_known_drops_published_titles_only() {
        let f = NearDuplicateFilter::new(["offshore wind auction results announced"]);
        let mut republished = item("https://news.google.com/rss/articles/x");
        republished.title = "Offshore wind auction results announced".into();
        let mut new_story = item("https://news.google.com/rss/articles/y");
        new_story.title = "battery storage tender closes".into();

        let (kept, dropped) = f.filter_known(vec![republished, new_story.clone(), new_story]);
        assert_eq!(dropped, 1);
        // In-run repeats are left for the post-classification check.
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|i| i.title == "battery storage tender closes"));
    }

    #[test]
    fn unsegmented_cjk_titles_do_not_match() {
        // Each title is one whitespace token, so the token sets are disjoint.
        let sim = title_similarity("台電啟動光電標案", "台電今日啟動光電標案計畫");
        assert_eq!(sim, 0.0);
        assert_eq!(title_similarity("台電啟動光電標案", "台電啟動光電標案"), 1.0);
    }

    #[test]
    fn empty_token_lists_never_match() {
        assert_eq!(title_similarity("a b c", "a b c"), 0.0);
        assert_eq!(title_similarity("", "solar"), 0.0);
    }
}
