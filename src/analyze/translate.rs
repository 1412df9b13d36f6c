// src/analyze/translate.rs
use crate::analyze::ai_adapter::LlmClient;
use crate::analyze::classify::language_label;
use crate::error::IngestError;

pub const TRANSLATE_MAX_TOKENS: u32 = 2000;
/// Bodies this short are left untranslated.
pub const MIN_TRANSLATABLE_CHARS: usize = 100;

pub fn needs_translation(plain_text: &str) -> bool {
    plain_text.chars().count() > MIN_TRANSLATABLE_CHARS
}

pub fn build_translation_prompt(plain_text: &str, publish_language: &str) -> String {
    format!(
        "Translate the following news article into {}. Keep it accurate and professional. \
         Separate paragraphs with a blank line and output only the translation.\n\n{plain_text}",
        language_label(publish_language)
    )
}

/// Split on blank lines and wrap each paragraph in an escaped `<p>`.
pub fn paragraphs_to_markup(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
        .collect()
}

pub async fn translate_body(
    llm: &dyn LlmClient,
    plain_text: &str,
    publish_language: &str,
) -> Result<String, IngestError> {
    let prompt = build_translation_prompt(plain_text, publish_language);
    let raw = llm
        .complete(&prompt, TRANSLATE_MAX_TOKENS)
        .await
        .map_err(|e| IngestError::Translation(format!("{e:#}")))?;
    let markup = paragraphs_to_markup(&raw);
    if markup.is_empty() {
        return Err(IngestError::Translation("empty translation".to_string()));
    }
    Ok(markup)
}
