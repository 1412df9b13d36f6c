// src/analyze/mod.rs
//! Language-model stage: classification and translation of scraped articles.

pub mod ai_adapter;
pub mod classify;
pub mod translate;

pub use ai_adapter::{build_client_from_config, DynLlmClient, LlmClient, MockClient};
pub use classify::{classify, is_foreign, parse_classification};
pub use translate::{needs_translation, translate_body};
