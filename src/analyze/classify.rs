// src/analyze/classify.rs
//! Classification prompt and the sanitize -> parse -> validate step.
//!
//! Every field of the model answer is validated on its own; a missing or
//! invalid field is replaced by its default and the rest is kept.

use metrics::counter;
use serde_json::Value;

use crate::analyze::ai_adapter::LlmClient;
use crate::error::IngestError;
use crate::ingest::types::ClassificationResult;

pub const REGIONS: &[&str] = &["Taiwan", "Asia", "Global"];
pub const DEFAULT_REGION: &str = "Taiwan";
pub const DEFAULT_TAG_VARIANT: &str = "General";
pub const SUMMARY_FALLBACK_CHARS: usize = 100;
pub const CLASSIFY_MAX_TOKENS: u32 = 400;
const TAG_VARIANT_MAX_CHARS: usize = 40;

/// Primary language subtag, lowercased (`zh-TW` -> `zh`).
pub fn primary_subtag(lang: &str) -> String {
    lang.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A source is foreign when its primary subtag differs from the publish
/// language's. Sources without a language are treated as native.
pub fn is_foreign(source_language: &str, publish_language: &str) -> bool {
    let src = primary_subtag(source_language);
    !src.is_empty() && src != primary_subtag(publish_language)
}

/// Human label for the publish language used inside prompts.
pub fn language_label(lang: &str) -> String {
    match lang.trim().to_ascii_lowercase().as_str() {
        "zh-tw" | "zh-hant" | "zh-hant-tw" => "Traditional Chinese (zh-TW)".to_string(),
        "zh-cn" | "zh-hans" => "Simplified Chinese (zh-CN)".to_string(),
        "en" | "en-us" | "en-gb" => "English".to_string(),
        _ => lang.trim().to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn build_classification_prompt(
    title: &str,
    plain_text: &str,
    foreign: bool,
    publish_language: &str,
    tags: &[String],
) -> String {
    let lang = language_label(publish_language);
    let tag_list = tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" / ");
    let mut p = String::with_capacity(plain_text.len() + 1024);
    p.push_str("You are an energy-industry news analyst. Analyze the article below and answer with a single JSON object only, no commentary.\n\n");
    p.push_str(&format!("Title: {title}\nContent: {plain_text}\n\nFields:\n"));
    let mut n = 1;
    if foreign {
        p.push_str(&format!("{n}. translatedTitle: the title translated into {lang}\n"));
        n += 1;
    }
    p.push_str(&format!(
        "{n}. summary: a summary in {lang}, at most 100 characters\n"
    ));
    p.push_str(&format!(
        "{}. region: \"Taiwan\" (Taiwan-related) / \"Asia\" (rest of Asia) / \"Global\"\n",
        n + 1
    ));
    p.push_str(&format!("{}. tag: one of {tag_list}\n", n + 2));
    p.push_str(&format!(
        "{}. tag_variant: a specific category in {lang} (e.g. solar, offshore wind, EV, policy, storage)\n\n",
        n + 3
    ));
    if foreign {
        p.push_str(r#"JSON: { "translatedTitle": "...", "summary": "...", "region": "...", "tag": "...", "tag_variant": "..." }"#);
    } else {
        p.push_str(r#"JSON: { "summary": "...", "region": "...", "tag": "...", "tag_variant": "..." }"#);
    }
    p.push('\n');
    p
}

/// Strip code fences and cut out the outermost `{...}`.
pub fn sanitize_model_json(raw: &str) -> Option<&str> {
    let s = raw.trim();
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn non_empty_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl ClassificationResult {
    /// Defaults used field-by-field when the model answer is unusable.
    pub fn defaults(title: &str, default_tag: &str, foreign: bool) -> Self {
        Self {
            summary: truncate_chars(title, SUMMARY_FALLBACK_CHARS),
            region: DEFAULT_REGION.to_string(),
            tag: default_tag.to_string(),
            tag_variant: DEFAULT_TAG_VARIANT.to_string(),
            translated_title: foreign.then(|| title.to_string()),
            translated_body: None,
        }
    }
}

/// Validate a raw model answer. Returns the result plus whether any field fell
/// back to its default.
pub fn parse_classification(
    raw: &str,
    title: &str,
    tags: &[String],
    foreign: bool,
) -> (ClassificationResult, bool) {
    let default_tag = tags.first().map(String::as_str).unwrap_or("再生能源");
    let mut out = ClassificationResult::defaults(title, default_tag, foreign);

    let parsed: Option<Value> = sanitize_model_json(raw)
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .filter(Value::is_object);
    let Some(v) = parsed else {
        return (out, true);
    };

    let mut fell_back = false;

    match non_empty_str(&v, "summary") {
        Some(s) => out.summary = s.to_string(),
        None => fell_back = true,
    }

    match non_empty_str(&v, "region")
        .and_then(|r| REGIONS.iter().find(|known| known.eq_ignore_ascii_case(r)))
    {
        Some(r) => out.region = (*r).to_string(),
        None => fell_back = true,
    }

    match non_empty_str(&v, "tag").and_then(|t| tags.iter().find(|known| known.as_str() == t)) {
        Some(t) => out.tag = t.clone(),
        None => fell_back = true,
    }

    match non_empty_str(&v, "tag_variant") {
        Some(s) => out.tag_variant = truncate_chars(s, TAG_VARIANT_MAX_CHARS),
        None => fell_back = true,
    }

    if foreign {
        match non_empty_str(&v, "translatedTitle") {
            Some(s) => out.translated_title = Some(s.to_string()),
            None => fell_back = true,
        }
    }

    (out, fell_back)
}

/// One classification call. Never fails: transport errors and unusable answers
/// both end in per-field defaults.
pub async fn classify(
    llm: &dyn LlmClient,
    title: &str,
    plain_text: &str,
    foreign: bool,
    publish_language: &str,
    tags: &[String],
) -> ClassificationResult {
    let prompt = build_classification_prompt(title, plain_text, foreign, publish_language, tags);
    let raw = match llm.complete(&prompt, CLASSIFY_MAX_TOKENS).await {
        Ok(raw) => raw,
        Err(e) => {
            let err = IngestError::Classification(format!("{e:#}"));
            tracing::warn!(error = %err, provider = llm.provider_name(), title = %title, "classification call failed; using defaults");
            counter!("ingest_classification_fallbacks_total").increment(1);
            return parse_classification("", title, tags, foreign).0;
        }
    };

    let (result, fell_back) = parse_classification(&raw, title, tags, foreign);
    if fell_back {
        tracing::warn!(title = %title, "model answer incomplete; defaults substituted");
        counter!("ingest_classification_fallbacks_total").increment(1);
    }
    result
}
