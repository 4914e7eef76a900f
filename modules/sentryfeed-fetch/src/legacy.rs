//! Tier 3: heuristic fallback when neither RSS nor Tier-2 selectors apply
//! (§4.E).

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sentryfeed_clean::html_to_text;
use sentryfeed_common::{ArticleCandidate, Scope, SentryFeedError};
use sentryfeed_http::HttpClient;
use uuid::Uuid;

/// Link/text ratio above which a subtree is treated as navigation, not body.
const NAVIGATION_LINK_DENSITY: f64 = 0.40;

const TITLE_SEPARATORS: &[char] = &['|', '—', '-'];

pub struct LegacyParser<'a> {
    client: &'a HttpClient,
}

impl<'a> LegacyParser<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    pub async fn extract(
        &self,
        source_id: Uuid,
        article_url: &str,
        rate_limit_per_minute: u32,
        scope: &Scope,
        user_agent_override: Option<&str>,
        timeout_seconds: Option<u64>,
    ) -> Result<ArticleCandidate, SentryFeedError> {
        let mut headers = sentryfeed_http::client::default_headers();
        if let Some(ua) = user_agent_override {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(ua) {
                headers.insert(reqwest::header::USER_AGENT, value);
            }
        }
        let request = sentryfeed_http::FetchRequest {
            url: article_url,
            method: reqwest::Method::GET,
            headers,
            timeout: std::time::Duration::from_secs(timeout_seconds.unwrap_or(30)),
            if_none_match: None,
            if_modified_since: None,
            scope,
        };
        let response = self.client.fetch(request, rate_limit_per_minute).await?;
        let html = response.text();
        let document = Html::parse_document(&html);

        let title = extract_title(&document).ok_or_else(|| {
            SentryFeedError::ExtractionFailed(format!("no <title> found for {article_url}"))
        })?;
        let body_html = densest_paragraph_subtree(&document).ok_or_else(|| {
            SentryFeedError::ExtractionFailed(format!(
                "no non-navigation paragraph-dense subtree found for {article_url}"
            ))
        })?;
        let content = html_to_text(&body_html);
        let published_at = sweep_for_date(&document);

        Ok(ArticleCandidate {
            source_id,
            original_url: article_url.to_string(),
            title,
            content,
            raw_html: Some(html),
            published_at,
            author: None,
            tags: Vec::new(),
            language: None,
            needs_fulltext: false,
        })
    }
}

/// `<title>` minus a trailing/leading site-name suffix split on `|`, `—`, `-`.
fn extract_title(document: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let raw = document.select(&sel).next()?.text().collect::<String>();
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parts: Vec<&str> = raw
        .split(TITLE_SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() <= 1 {
        return Some(raw.to_string());
    }
    // The headline is usually the longest segment; site names tend to be short.
    parts
        .into_iter()
        .max_by_key(|s| s.len())
        .map(str::to_string)
}

/// Finds the element with the most paragraph text whose link density stays
/// below the navigation threshold.
fn densest_paragraph_subtree(document: &Html) -> Option<String> {
    let candidates_sel = Selector::parse("article, main, div, section").ok()?;
    let p_sel = Selector::parse("p").ok()?;
    let a_sel = Selector::parse("a").ok()?;

    let mut best: Option<(usize, String)> = None;
    for el in document.select(&candidates_sel) {
        let paragraph_text: usize = el
            .select(&p_sel)
            .map(|p| p.text().collect::<String>().chars().count())
            .sum();
        if paragraph_text < 140 {
            continue;
        }

        let total_text = el.text().collect::<String>().chars().count().max(1);
        let link_text: usize = el
            .select(&a_sel)
            .map(|a| a.text().collect::<String>().chars().count())
            .sum();
        let link_density = link_text as f64 / total_text as f64;
        if link_density > NAVIGATION_LINK_DENSITY {
            continue;
        }

        if best.as_ref().map(|(len, _)| paragraph_text > *len).unwrap_or(true) {
            best = Some((paragraph_text, el.html()));
        }
    }
    best.map(|(_, html)| html)
}

fn sweep_for_date(document: &Html) -> Option<DateTime<Utc>> {
    let body_sel = Selector::parse("body").ok()?;
    let body: ElementRef = document.select(&body_sel).next()?;
    let text = body.text().collect::<String>();
    let head: String = text.chars().take(2000).collect();
    let head = head.as_str();

    let iso = Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").ok()?;
    if let Some(m) = iso.captures(head) {
        if let Ok(date) = NaiveDate::parse_from_str(&m[1], "%Y-%m-%d") {
            return Some(DateTime::from_naive_utc_and_offset(
                date.and_hms_opt(0, 0, 0).unwrap(),
                Utc,
            ));
        }
    }

    let month_day_year = Regex::new(
        r"\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .ok()?;
    if let Some(m) = month_day_year.captures(head) {
        let candidate = format!("{} {} {}", &m[1], &m[2], &m[3]);
        for pattern in ["%B %d %Y", "%b %d %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, pattern) {
                return Some(DateTime::from_naive_utc_and_offset(
                    date.and_hms_opt(0, 0, 0).unwrap(),
                    Utc,
                ));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_site_suffix() {
        let html = "<html><head><title>Breach at Acme Corp | Acme News</title></head><body></body></html>";
        let document = Html::parse_document(html);
        assert_eq!(extract_title(&document).as_deref(), Some("Breach at Acme Corp"));
    }

    #[test]
    fn navigation_heavy_subtree_is_excluded() {
        let html = r#"
            <html><body>
            <nav><p>Home</p><a href="/a">A</a><a href="/b">B</a><a href="/c">C</a><a href="/d">D</a></nav>
            <article><p>This is a long paragraph of genuine article content that should be picked over navigation links because it carries far more text than the anchors surrounding it in the page layout.</p></article>
            </body></html>
        "#;
        let document = Html::parse_document(html);
        let body = densest_paragraph_subtree(&document).expect("article subtree found");
        assert!(body.contains("genuine article content"));
    }

    #[test]
    fn date_sweep_finds_iso_date_near_top() {
        let html = "<html><body><p>Published 2026-03-14 by staff.</p><p>Lots of other unrelated body text follows after this point in the document to pad things out.</p></body></html>";
        let document = Html::parse_document(html);
        let date = sweep_for_date(&document).expect("date found");
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2026-03-14");
    }
}
