//! Language-model adapter: provider abstraction for single-prompt completions.
//!
//! The pipeline only ever sends one text prompt and reads free text back; all
//! JSON handling lives with the callers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ai::{load_ai_config, AiConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Trait object used by the pipeline (and tests).
pub trait LlmClient: Send + Sync {
    /// Send `prompt`, return the raw completion text.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynLlmClient = Arc<dyn LlmClient>;

/// Reads `config/ai.json` and builds a client.
pub fn build_llm_client() -> DynLlmClient {
    let cfg = load_ai_config();
    build_client_from_config(&cfg)
}

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider (OpenAI).
pub fn build_client_from_config(config: &AiConfig) -> DynLlmClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockClient::fixed(
            r#"{"summary":"Mock summary","region":"Taiwan","tag":"再生能源","tag_variant":"General"}"#,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiClient::new(config) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::warn!(error = ?e, "openai client unavailable; model disabled");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown ai provider; model disabled");
            Arc::new(DisabledClient)
        }
    }
}

/// OpenAI Chat Completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = if config.api_key.trim().is_empty() || config.api_key.eq_ignore_ascii_case("env") {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            config.api_key.clone()
        };
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-ingest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building openai http client")?;
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{base}/chat/completions"),
            temperature: config.temperature,
        })
    }

    async fn complete_impl(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("chat completion returned {status}: {body}");
        }
        let body: Resp = resp.json().await.context("decoding chat completion")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completion had no content"))
    }
}

impl LlmClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt, max_tokens))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; classification then falls back to defaults and translation
/// keeps the original content.
pub struct DisabledClient;

impl LlmClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
        _max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("language model disabled")) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Scripted client for tests and local runs. Every prompt is recorded.
pub struct MockClient {
    respond: Box<Responder>,
    calls: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same answer for every prompt.
    pub fn fixed(answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self::new(move |_| Ok(answer.clone()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|g| g.len()).unwrap_or(0)
    }
}

impl LlmClient for MockClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        _max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        if let Ok(mut g) = self.calls.lock() {
            g.push(prompt.to_string());
        }
        let out = (self.respond)(prompt);
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[tokio::test]
    async fn mock_mode_overrides_config() {
        std::env::set_var("AI_TEST_MODE", "mock");
        let client = build_client_from_config(&AiConfig::default());
        std::env::remove_var("AI_TEST_MODE");
        assert_eq!(client.provider_name(), "mock");
        let out = client.complete("anything", 10).await.unwrap();
        assert!(out.contains("\"region\":\"Taiwan\""));
    }

    #[serial_test::serial]
    #[tokio::test]
    async fn disabled_config_yields_failing_client() {
        std::env::remove_var("AI_TEST_MODE");
        let client = build_client_from_config(&AiConfig::default());
        assert_eq!(client.provider_name(), "disabled");
        assert!(client.complete("x", 10).await.is_err());
    }

    #[tokio::test]
    async fn mock_records_prompts() {
        let m = MockClient::new(|p| {
            if p.contains("fail") {
                Err(anyhow!("boom"))
            } else {
                Ok(p.to_uppercase())
            }
        });
        assert_eq!(m.complete("abc", 1).await.unwrap(), "ABC");
        assert!(m.complete("fail", 1).await.is_err());
        assert_eq!(m.calls(), vec!["abc".to_string(), "fail".to_string()]);
    }
}
