//! Tier 2: structured-scrape extraction — JSON-LD, OpenGraph, microdata,
//! then CSS-selector hints, in that priority order (§4.D).

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use sentryfeed_clean::html_to_text;
use sentryfeed_common::{ArticleCandidate, ExtractHints, Scope, SentryFeedError};
use sentryfeed_http::HttpClient;
use uuid::Uuid;

struct Extracted {
    title: String,
    body_html: String,
    published_at: Option<DateTime<Utc>>,
    author: Option<String>,
}

pub struct ModernScraper<'a> {
    client: &'a HttpClient,
}

impl<'a> ModernScraper<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    pub async fn extract(
        &self,
        source_id: Uuid,
        article_url: &str,
        rate_limit_per_minute: u32,
        scope: &Scope,
        hints: &ExtractHints,
        user_agent_override: Option<&str>,
        timeout_seconds: Option<u64>,
    ) -> Result<ArticleCandidate, SentryFeedError> {
        let request = sentryfeed_http::FetchRequest {
            url: article_url,
            method: reqwest::Method::GET,
            headers: headers_with_ua_override(user_agent_override),
            timeout: std::time::Duration::from_secs(timeout_seconds.unwrap_or(30)),
            if_none_match: None,
            if_modified_since: None,
            scope,
        };
        let response = self.client.fetch(request, rate_limit_per_minute).await?;
        let html = response.text();
        let document = Html::parse_document(&html);

        let extracted = extract_json_ld(&document)
            .or_else(|| extract_opengraph(&document))
            .or_else(|| extract_microdata(&document))
            .or_else(|| extract_via_hints(&document, hints))
            .ok_or_else(|| {
                SentryFeedError::ExtractionFailed(format!(
                    "no extraction strategy yielded a title+body for {article_url}"
                ))
            })?;

        let content = html_to_text(&extracted.body_html);

        Ok(ArticleCandidate {
            source_id,
            original_url: article_url.to_string(),
            title: extracted.title,
            content,
            raw_html: Some(html),
            published_at: extracted.published_at,
            author: extracted.author,
            tags: Vec::new(),
            language: None,
            needs_fulltext: false,
        })
    }

    /// §4.D discovery: fetch a listing page and resolve every `href` matched
    /// by `post_link_selector` into an absolute article URL, deduplicated
    /// and capped at `max_pages` * a generous per-page link budget. `max_pages`
    /// is a pagination bound; this flat discovery pass has no pagination
    /// loop yet, so it is applied as a simple result cap instead.
    pub async fn discover_links(
        &self,
        listing_url: &str,
        rate_limit_per_minute: u32,
        scope: &Scope,
        post_link_selector: &str,
        max_pages: Option<u32>,
        user_agent_override: Option<&str>,
        timeout_seconds: Option<u64>,
    ) -> Result<Vec<String>, SentryFeedError> {
        let request = sentryfeed_http::FetchRequest {
            url: listing_url,
            method: reqwest::Method::GET,
            headers: headers_with_ua_override(user_agent_override),
            timeout: std::time::Duration::from_secs(timeout_seconds.unwrap_or(30)),
            if_none_match: None,
            if_modified_since: None,
            scope,
        };
        let response = self.client.fetch(request, rate_limit_per_minute).await?;
        let html = response.text();
        let document = Html::parse_document(&html);
        let base = url::Url::parse(listing_url)
            .map_err(|e| SentryFeedError::ExtractionFailed(format!("invalid listing url: {e}")))?;

        let sel = Selector::parse(post_link_selector).map_err(|_| {
            SentryFeedError::ExtractionFailed(format!("invalid post_link_selector: {post_link_selector}"))
        })?;

        let cap = max_pages.unwrap_or(1).max(1) as usize * DISCOVERY_LINKS_PER_PAGE;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            let resolved = resolved.to_string();
            if seen.insert(resolved.clone()) {
                out.push(resolved);
            }
            if out.len() >= cap {
                break;
            }
        }
        Ok(out)
    }
}

/// Starts from the tier's default `Accept` header, adding a `User-Agent`
/// override if the source configures one (§6 `user_agent_override`).
fn headers_with_ua_override(user_agent_override: Option<&str>) -> reqwest::header::HeaderMap {
    let mut headers = sentryfeed_http::client::default_headers();
    if let Some(ua) = user_agent_override {
        if let Ok(value) = reqwest::header::HeaderValue::from_str(ua) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }
    }
    headers
}

/// Discovery result cap per listing page when `max_pages` carries no other
/// pagination signal (SPEC_FULL discovery is a single-page fetch, not a
/// paginator; `max_pages` bounds how many links we trust from it).
const DISCOVERY_LINKS_PER_PAGE: usize = 40;

/// SPEC_FULL §0 supplemented feature 2: `<link rel="alternate"
/// type="application/rss+xml"|"application/atom+xml">` discovery on a
/// Tier-2/3 listing page.
pub fn discover_feed_urls(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse(r#"link[rel="alternate"]"#) else {
        return Vec::new();
    };

    let mut feeds = Vec::new();
    for el in document.select(&sel) {
        let ty = el.value().attr("type").unwrap_or("");
        if !matches!(ty, "application/rss+xml" | "application/atom+xml") {
            continue;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if let Ok(resolved) = base.join(href) {
            feeds.push(resolved.to_string());
        }
    }
    feeds
}

fn parse_selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = parse_selector(selector)?;
    document
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .filter(|t| !t.is_empty())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = parse_selector(selector)?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

fn select_html(document: &Html, selector: &str) -> Option<String> {
    let sel = parse_selector(selector)?;
    document.select(&sel).next().map(|el| el.html())
}

/// §4.D.1: JSON-LD `Article`/`NewsArticle`/`BlogPosting` nodes.
fn extract_json_ld(document: &Html) -> Option<Extracted> {
    let sel = parse_selector(r#"script[type="application/ld+json"]"#)?;
    for node in document.select(&sel) {
        let raw = node.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        for candidate in flatten_json_ld(&value) {
            let ty = candidate.get("@type").and_then(|v| v.as_str()).unwrap_or("");
            if !matches!(ty, "Article" | "NewsArticle" | "BlogPosting") {
                continue;
            }
            let headline = candidate
                .get("headline")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let body = candidate
                .get("articleBody")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if let (Some(headline), Some(body)) = (headline, body) {
                let published_at = candidate
                    .get("datePublished")
                    .and_then(|v| v.as_str())
                    .and_then(parse_date);
                let author = candidate
                    .get("author")
                    .and_then(json_ld_author_name);
                return Some(Extracted {
                    title: headline,
                    body_html: body,
                    published_at,
                    author,
                });
            }
        }
    }
    None
}

fn flatten_json_ld(value: &serde_json::Value) -> Vec<&serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                flatten_json_ld(graph)
            } else {
                vec![value]
            }
        }
        _ => Vec::new(),
    }
}

fn json_ld_author_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map.get("name").and_then(|v| v.as_str()).map(str::to_string),
        serde_json::Value::Array(items) => items.first().and_then(json_ld_author_name),
        _ => None,
    }
}

/// §4.D.2: OpenGraph meta tags plus `article`/`main`/selector-hinted body.
fn extract_opengraph(document: &Html) -> Option<Extracted> {
    let title = select_attr(document, r#"meta[property="og:title"]"#, "content")?;
    let body_html = select_html(document, "article")
        .or_else(|| select_html(document, "main"))?;
    let published_at = select_attr(document, r#"meta[property="article:published_time"]"#, "content")
        .and_then(|s| parse_date(&s));
    let author = select_attr(document, r#"meta[property="article:author"]"#, "content");
    Some(Extracted {
        title,
        body_html,
        published_at,
        author,
    })
}

/// §4.D.3: microdata `itemprop` attributes.
fn extract_microdata(document: &Html) -> Option<Extracted> {
    let title = select_text(document, r#"[itemprop="headline"]"#)?;
    let body_html = select_html(document, r#"[itemprop="articleBody"]"#)?;
    let published_at = select_attr(document, r#"[itemprop="datePublished"]"#, "datetime")
        .and_then(|s| parse_date(&s));
    Some(Extracted {
        title,
        body_html,
        published_at,
        author: None,
    })
}

/// §4.D.4: source-configured CSS selector hints. Selector lists are
/// semicolon-separated fallbacks; `selector::attr(name)` reads an attribute
/// instead of text content.
fn extract_via_hints(document: &Html, hints: &ExtractHints) -> Option<Extracted> {
    let title = first_match(document, &hints.title_selectors)?;
    let body_html = hints
        .body_selectors
        .iter()
        .flat_map(|group| group.split(';'))
        .map(str::trim)
        .find_map(|sel| select_html(document, sel))?;
    let published_at = hints
        .date_selectors
        .iter()
        .flat_map(|group| group.split(';'))
        .map(str::trim)
        .find_map(|sel| resolve_hinted(document, sel))
        .and_then(|s| parse_date(&s));
    let author = hints
        .author_selectors
        .iter()
        .flat_map(|group| group.split(';'))
        .map(str::trim)
        .find_map(|sel| resolve_hinted(document, sel));

    Some(Extracted {
        title,
        body_html,
        published_at,
        author,
    })
}

fn first_match(document: &Html, groups: &[String]) -> Option<String> {
    groups
        .iter()
        .flat_map(|group| group.split(';'))
        .map(str::trim)
        .find_map(|sel| resolve_hinted(document, sel))
}

/// Resolves a `selector` or `selector::attr(name)` hint against the document.
fn resolve_hinted(document: &Html, hint: &str) -> Option<String> {
    if let Some((selector, rest)) = hint.split_once("::attr(") {
        let attr = rest.trim_end_matches(')');
        select_attr(document, selector.trim(), attr)
    } else {
        select_text(document, hint)
    }
}

/// ISO 8601 preferred; falls back to a short list of locale-agnostic patterns.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const PATTERNS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d", "%B %d, %Y", "%d %B %Y"];
    for pattern in PATTERNS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, pattern) {
            return Some(DateTime::from_naive_utc_and_offset(
                date.and_hms_opt(0, 0, 0).unwrap(),
                Utc,
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_ld_extracts_headline_and_body() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            {"@type":"NewsArticle","headline":"Breach disclosed","articleBody":"<p>Details here.</p>","datePublished":"2026-01-02T00:00:00Z","author":{"name":"Jane Doe"}}
            </script>
            </head><body></body></html>
        "#;
        let document = Html::parse_document(html);
        let extracted = extract_json_ld(&document).expect("json-ld present");
        assert_eq!(extracted.title, "Breach disclosed");
        assert_eq!(extracted.author.as_deref(), Some("Jane Doe"));
        assert!(extracted.published_at.is_some());
    }

    #[test]
    fn opengraph_falls_back_to_article_tag() {
        let html = r#"
            <html><head>
            <meta property="og:title" content="OG Title">
            </head><body><article><p>Body text.</p></article></body></html>
        "#;
        let document = Html::parse_document(html);
        let extracted = extract_opengraph(&document).expect("og present");
        assert_eq!(extracted.title, "OG Title");
        assert!(extracted.body_html.contains("Body text"));
    }

    #[test]
    fn hint_selector_supports_attr_syntax() {
        let html = r#"<html><body><time datetime="2026-01-02">Jan 2</time></body></html>"#;
        let document = Html::parse_document(html);
        let value = resolve_hinted(&document, "time::attr(datetime)");
        assert_eq!(value.as_deref(), Some("2026-01-02"));
    }

    #[test]
    fn extraction_order_prefers_json_ld_over_opengraph() {
        let html = r#"
            <html><head>
            <meta property="og:title" content="OG Title">
            <script type="application/ld+json">
            {"@type":"Article","headline":"JSONLD Title","articleBody":"<p>content</p>"}
            </script>
            </head><body><article><p>fallback</p></article></body></html>
        "#;
        let document = Html::parse_document(html);
        let extracted = extract_json_ld(&document)
            .or_else(|| extract_opengraph(&document))
            .expect("some extractor matches");
        assert_eq!(extracted.title, "JSONLD Title");
    }
}
