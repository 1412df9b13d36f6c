// src/ingest/resolve.rs
//! Aggregator link resolution: one request with redirects disabled, then the
//! `Location` header, then the `url` query parameter.

use reqwest::header::LOCATION;
use url::Url;

use crate::error::IngestError;
use crate::ingest::config::ResolveMode;

/// Whether `link` should go through the resolver under `mode`.
pub fn needs_resolution(link: &str, mode: ResolveMode, aggregator_hosts: &[String]) -> bool {
    match mode {
        ResolveMode::Never => false,
        ResolveMode::Always => true,
        ResolveMode::Auto => Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| aggregator_hosts.iter().any(|h| host_matches(&host, h))),
    }
}

/// `host` equals `pattern` or is a subdomain of it.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern
        || host
            .strip_suffix(pattern)
            .is_some_and(|head| head.ends_with('.'))
}

fn http_url(u: Url) -> Option<String> {
    matches!(u.scheme(), "http" | "https").then(|| u.to_string())
}

/// `url=` query parameter of `link`, when it holds an absolute http(s) URL.
pub fn url_from_query(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    let raw = parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())?;
    Url::parse(&raw).ok().and_then(http_url)
}

/// Read `Location` off a non-following request; relative values are joined
/// against `link`.
pub async fn resolve_link(client: &reqwest::Client, link: &str) -> Result<String, IngestError> {
    let base = Url::parse(link).map_err(|e| IngestError::Resolve {
        link: link.to_string(),
        reason: format!("invalid link: {e}"),
    })?;

    match client.head(base.clone()).send().await {
        Ok(resp) => {
            let located = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| base.join(loc.trim()).ok())
                .and_then(http_url);
            if let Some(target) = located {
                tracing::debug!(from = %link, to = %target, "resolved via Location");
                return Ok(target);
            }
        }
        Err(e) => {
            tracing::debug!(error = ?e, link = %link, "resolver request failed");
        }
    }

    url_from_query(link).ok_or_else(|| IngestError::Resolve {
        link: link.to_string(),
        reason: "no Location header and no url parameter".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_matches_aggregator_hosts_only() {
        let hosts = vec!["news.google.com".to_string()];
        assert!(needs_resolution(
            "https://news.google.com/rss/articles/abc",
            ResolveMode::Auto,
            &hosts
        ));
        assert!(!needs_resolution("https://energy.test/a/1", ResolveMode::Auto, &hosts));
        assert!(!needs_resolution("https://fakenews.google.com.evil.test/", ResolveMode::Auto, &hosts));
        assert!(needs_resolution("https://energy.test/a/1", ResolveMode::Always, &hosts));
        assert!(!needs_resolution(
            "https://news.google.com/x",
            ResolveMode::Never,
            &hosts
        ));
    }

    #[test]
    fn host_suffix_requires_label_boundary() {
        assert!(host_matches("lh3.googleusercontent.com", "googleusercontent.com"));
        assert!(!host_matches("notgoogleusercontent.com", "googleusercontent.com"));
    }

    #[test]
    fn url_param_is_recovered() {
        let link = "https://news.google.com/articles/x?url=https%3A%2F%2Fenergy.test%2Fa%2F1&hl=zh-TW";
        assert_eq!(url_from_query(link).as_deref(), Some("https://energy.test/a/1"));
        assert_eq!(url_from_query("https://news.google.com/articles/x?url=javascript:alert(1)"), None);
        assert_eq!(url_from_query("https://news.google.com/articles/x"), None);
    }
}
