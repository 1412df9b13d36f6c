// src/ingest/gate.rs
use crate::error::IngestError;
use crate::ingest::types::ScrapedArticle;

pub const DEFAULT_MIN_CONTENT_CHARS: usize = 300;

/// Reject articles whose structured markup is shorter than `min_chars` characters.
pub fn content_gate(article: &ScrapedArticle, min_chars: usize) -> Result<(), IngestError> {
    let len = article.structured_content.chars().count();
    if len < min_chars {
        return Err(IngestError::ContentTooShort {
            url: article.canonical_url.clone(),
            len,
            min: min_chars,
        });
    }
    Ok(())
}
