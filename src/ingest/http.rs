// src/ingest/http.rs
use anyhow::{Context, Result};
use reqwest::redirect::Policy;
use std::time::Duration;

use crate::ingest::config::PipelineConfig;

/// Shared clients for one pipeline. `fetch` follows redirects (feeds, article
/// pages); `no_redirect` is used to read `Location` off aggregator links.
#[derive(Clone)]
pub struct HttpClients {
    pub fetch: reqwest::Client,
    pub no_redirect: reqwest::Client,
}

impl HttpClients {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.http_timeout_secs);
        let fetch = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .redirect(Policy::limited(10))
            .build()
            .context("building fetch client")?;
        let no_redirect = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .context("building resolver client")?;
        Ok(Self { fetch, no_redirect })
    }
}
