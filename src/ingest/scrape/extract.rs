// src/ingest/scrape/extract.rs
//! Structured content extraction from arbitrary article HTML.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub const MIN_PARAGRAPH_CHARS: usize = 20;
pub const SWEEP_PARAGRAPH_CHARS: usize = 30;
/// Below this, the page-wide paragraph sweep is tried as well.
pub const SPARSE_MARKUP_CHARS: usize = 500;
pub const PLAIN_TEXT_CAP: usize = 3000;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("static selector {css:?}: {e:?}"))
}

static JUNK: Lazy<Selector> = Lazy::new(|| {
    selector(
        "script, style, iframe, nav, footer, header, aside, .ad, .advertisement, \
         .related-posts, .menu, .popup, .social-share, .comments",
    )
});
static BLOCKS: Lazy<Selector> =
    Lazy::new(|| selector("h1, h2, h3, h4, h5, h6, p, ul, ol, blockquote, img"));
static BLOCK_WRAPPERS: Lazy<Selector> = Lazy::new(|| selector("ul, ol, blockquote"));
static LIST_ITEMS: Lazy<Selector> = Lazy::new(|| selector("li"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("p"));

/// Ordered container strategies; the first one yielding markup wins.
pub const CONTAINER_STRATEGIES: &[&str] = &[
    "article",
    "main",
    ".post-content, .article-content, .story-body, .entry-content",
];

static CONTAINERS: Lazy<Vec<Selector>> =
    Lazy::new(|| CONTAINER_STRATEGIES.iter().copied().map(selector).collect());

fn in_junk(el: &ElementRef<'_>) -> bool {
    JUNK.matches(el) || el.ancestors().filter_map(ElementRef::wrap).any(|a| JUNK.matches(&a))
}

/// Element text with junk descendants skipped and whitespace collapsed.
pub fn visible_text(el: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let junk = node
            .ancestors()
            .take_while(|a| a.id() != el.id())
            .filter_map(ElementRef::wrap)
            .any(|a| JUNK.matches(&a));
        if !junk {
            buf.push_str(text);
            buf.push(' ');
        }
    }
    collapse_ws(&buf)
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

/// Absolute http(s) URL for `raw`, resolved against `base`.
pub fn absolute_http_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = match base {
        Some(b) => b.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

pub fn image_src(el: &ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let v = el.value();
    v.attr("src")
        .filter(|s| !s.trim().is_empty() && !s.trim_start().starts_with("data:"))
        .or_else(|| v.attr("data-src"))
        .and_then(|s| absolute_http_url(s, base))
}

/// `el` sits inside a list/blockquote that is itself inside `container`.
fn nested_in_wrapper(el: &ElementRef<'_>, container: &ElementRef<'_>) -> bool {
    el.ancestors()
        .take_while(|a| a.id() != container.id())
        .filter_map(ElementRef::wrap)
        .any(|a| BLOCK_WRAPPERS.matches(&a))
}

fn render_block(el: &ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let tag = el.value().name();
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = visible_text(el);
            (!text.is_empty()).then(|| format!("<{tag}>{}</{tag}>", escape(&text)))
        }
        "p" => {
            let text = visible_text(el);
            (text.chars().count() > MIN_PARAGRAPH_CHARS).then(|| format!("<p>{}</p>", escape(&text)))
        }
        "ul" | "ol" => {
            let items: String = el
                .select(&LIST_ITEMS)
                .filter(|li| !in_junk(li))
                .map(|li| visible_text(&li))
                .filter(|t| !t.is_empty())
                .map(|t| format!("<li>{}</li>", escape(&t)))
                .collect();
            (!items.is_empty()).then(|| format!("<{tag}>{items}</{tag}>"))
        }
        "blockquote" => {
            let text = visible_text(el);
            (!text.is_empty()).then(|| format!("<blockquote>{}</blockquote>", escape(&text)))
        }
        "img" => {
            let src = image_src(el, base)?;
            let alt = el.value().attr("alt").unwrap_or_default();
            Some(format!(
                "<img src=\"{}\" alt=\"{}\" />",
                html_escape::encode_double_quoted_attribute(&src),
                html_escape::encode_double_quoted_attribute(alt.trim())
            ))
        }
        _ => None,
    }
}

/// Walk the content blocks of one container in document order.
pub fn extract_blocks(container: &ElementRef<'_>, base: Option<&Url>) -> String {
    let mut out = String::new();
    for el in container.select(&BLOCKS) {
        if in_junk(&el) || nested_in_wrapper(&el, container) {
            continue;
        }
        if let Some(block) = render_block(&el, base) {
            out.push_str(&block);
        }
    }
    out
}

/// Every paragraph on the page longer than the sweep minimum.
pub fn paragraph_sweep(doc: &Html) -> String {
    doc.select(&PARAGRAPHS)
        .filter(|p| !in_junk(p))
        .map(|p| visible_text(&p))
        .filter(|t| t.chars().count() > SWEEP_PARAGRAPH_CHARS)
        .map(|t| format!("<p>{}</p>", escape(&t)))
        .collect()
}

/// Container strategies in order, then the sweep when the result is sparse.
pub fn structured_content(doc: &Html, base: Option<&Url>) -> String {
    let mut markup = String::new();
    for sel in CONTAINERS.iter() {
        let found = doc
            .select(sel)
            .filter(|c| !in_junk(c))
            .map(|c| extract_blocks(&c, base))
            .find(|m| !m.is_empty());
        if let Some(m) = found {
            markup = m;
            break;
        }
    }

    let len = markup.chars().count();
    if len < SPARSE_MARKUP_CHARS {
        let swept = paragraph_sweep(doc);
        if swept.chars().count() > len {
            markup = swept;
        }
    }
    markup
}

/// Plain text of structured markup, whitespace collapsed and capped.
pub fn plain_text_projection(markup: &str) -> String {
    let frag = Html::parse_fragment(markup);
    let text = collapse_ws(&frag.root_element().text().collect::<Vec<_>>().join(" "));
    if text.chars().count() > PLAIN_TEXT_CAP {
        text.chars().take(PLAIN_TEXT_CAP).collect()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://energy.test/news/2025/solar.html").unwrap()
    }

    #[test]
    fn article_blocks_are_kept_and_junk_dropped() {
        let html = r#"<html><body>
<header><p>Site header paragraph that is long enough</p></header>
<article>
  <h1>Solar tender</h1>
  <p>Short</p>
  <p>The island's grid operator opened a new round of solar tenders.</p>
  <div class="social-share"><p>Share this article with all your friends now</p></div>
  <script>var x = 1;</script>
  <ul><li>100 MW</li><li>  </li><li>Rooftop &amp; ground</li></ul>
  <blockquote><p>We expect strong demand.</p></blockquote>
  <img src="/img/panel.jpg" alt="Panels">
  <img src="data:image/png;base64,AAAA" data-src="//cdn.energy.test/p.png">
</article>
</body></html>"#;
        let doc = Html::parse_document(html);
        let m = structured_content(&doc, Some(&base()));
        assert!(m.starts_with("<h1>Solar tender</h1>"));
        assert!(m.contains("<p>The island's grid operator"));
        assert!(!m.contains("Short"));
        assert!(!m.contains("Share this"));
        assert!(!m.contains("var x"));
        assert!(!m.contains("Site header"));
        assert!(m.contains("<ul><li>100 MW</li><li>Rooftop &amp; ground</li></ul>"));
        assert!(m.contains("<blockquote>We expect strong demand.</blockquote>"));
        assert_eq!(m.matches("<p>").count(), 1, "blockquote paragraph is not repeated");
        assert!(m.contains(r#"<img src="https://energy.test/img/panel.jpg" alt="Panels" />"#));
        assert!(m.contains(r#"<img src="https://cdn.energy.test/p.png" alt="" />"#));
    }

    #[test]
    fn falls_through_to_later_strategies() {
        let html = r#"<html><body>
<article><nav><p>Menu paragraph is not content at all here</p></nav></article>
<div class="entry-content"><h2>Wind</h2></div>
</body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(structured_content(&doc, None), "<h2>Wind</h2>");
    }

    #[test]
    fn sparse_result_is_replaced_by_sweep() {
        let html = r#"<html><body>
<article><h1>Headline</h1></article>
<div><p>First loose paragraph with enough characters in it.</p>
<p>Tiny text</p>
<p>Second loose paragraph with enough characters in it.</p></div>
<footer><p>Copyright paragraph that should never be swept up.</p></footer>
</body></html>"#;
        let doc = Html::parse_document(html);
        let m = structured_content(&doc, None);
        assert_eq!(
            m,
            "<p>First loose paragraph with enough characters in it.</p>\
             <p>Second loose paragraph with enough characters in it.</p>"
        );
    }

    #[test]
    fn plain_text_is_collapsed_and_capped() {
        let markup = "<h1>A</h1><p>b   c</p><ul><li>d</li></ul>";
        assert_eq!(plain_text_projection(markup), "A b c d");
        let long = format!("<p>{}</p>", "字".repeat(4000));
        assert_eq!(plain_text_projection(&long).chars().count(), PLAIN_TEXT_CAP);
    }
}
