// src/ingest/scrape/image.rs
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use super::extract::{absolute_http_url, image_src};
use crate::ingest::resolve::host_matches;

static OG_IMAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:image"]"#).unwrap_or_else(|e| panic!("{e:?}"))
});
static TWITTER_IMAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="twitter:image"], meta[property="twitter:image"]"#)
        .unwrap_or_else(|e| panic!("{e:?}"))
});
static BODY_IMAGES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article img, .article img, .post-content img, main img")
        .unwrap_or_else(|e| panic!("{e:?}"))
});

fn is_proxy_image(url: &str, proxy_hosts: &[String]) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| proxy_hosts.iter().any(|p| host_matches(&host, p)))
}

/// `og:image`, then `twitter:image`, then the first body image. Aggregator
/// proxy images are never chosen.
pub fn representative_image(doc: &Html, base: Option<&Url>, proxy_hosts: &[String]) -> Option<String> {
    let usable = |u: &String| !is_proxy_image(u, proxy_hosts);

    let meta = [&*OG_IMAGE, &*TWITTER_IMAGE].into_iter().find_map(|sel| {
        doc.select(sel)
            .filter_map(|m| m.value().attr("content"))
            .filter_map(|c| absolute_http_url(c, base))
            .find(usable)
    });
    if meta.is_some() {
        return meta;
    }

    doc.select(&BODY_IMAGES)
        .filter_map(|img| image_src(&img, base))
        .find(usable)
}
