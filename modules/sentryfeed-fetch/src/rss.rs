//! Tier 1: RSS 2.0 / Atom 1.0 / RDF feed parsing (§4.C).

use chrono::{DateTime, Utc};
use feed_rs::parser;
use sentryfeed_clean::html_to_text;
use sentryfeed_common::{ArticleCandidate, Scope, SentryFeedError};
use sentryfeed_http::HttpClient;
use uuid::Uuid;

/// Body shorter than this is treated as a teaser; the candidate is flagged
/// `needs_fulltext` so the fetcher follows up with Tier 2 on the linked URL.
const FULLTEXT_MIN_CHARS: usize = 400;

/// Fetch metadata alongside the parsed candidates, so the caller can record
/// the ETag/Last-Modified/HTTP status a conditional re-check needs (§4.F).
pub struct RssFetchOutcome {
    pub candidates: Vec<ArticleCandidate>,
    pub http_status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct RssParser<'a> {
    client: &'a HttpClient,
}

impl<'a> RssParser<'a> {
    pub fn new(client: &'a HttpClient) -> Self {
        Self { client }
    }

    /// Fetches and parses a feed. A 304 (conditional hit) returns an empty
    /// candidate list — the caller records success-without-new-items and
    /// moves on — but the response's ETag/Last-Modified/status are always
    /// captured so `record_check_success` can refresh conditional headers.
    pub async fn parse(
        &self,
        source_id: Uuid,
        feed_url: &str,
        rate_limit_per_minute: u32,
        scope: &Scope,
        etag: Option<&str>,
        last_modified: Option<&str>,
        user_agent_override: Option<&str>,
        timeout_seconds: Option<u64>,
    ) -> Result<RssFetchOutcome, SentryFeedError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ua) = user_agent_override {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(ua) {
                headers.insert(reqwest::header::USER_AGENT, value);
            }
        }
        let request = sentryfeed_http::FetchRequest {
            url: feed_url,
            method: reqwest::Method::GET,
            headers,
            timeout: std::time::Duration::from_secs(timeout_seconds.unwrap_or(30)),
            if_none_match: etag,
            if_modified_since: last_modified,
            scope,
        };

        let response = self.client.fetch(request, rate_limit_per_minute).await?;
        let http_status = response.status;
        // A 304 often omits the validator headers it was sent with; fall
        // back to the request's own etag/last-modified so a server that
        // doesn't echo them doesn't cost us the conditional-fetch state.
        let out_etag = response.etag().or_else(|| etag.map(str::to_string));
        let out_last_modified = response.last_modified().or_else(|| last_modified.map(str::to_string));

        if response.status == 304 {
            return Ok(RssFetchOutcome {
                candidates: Vec::new(),
                http_status,
                etag: out_etag,
                last_modified: out_last_modified,
            });
        }

        let body = response.body.clone();
        let feed = parser::parse(body.as_slice())
            .map_err(|e| SentryFeedError::ExtractionFailed(format!("feed parse error: {e}")))?;

        let base = url::Url::parse(feed_url)
            .map_err(|e| SentryFeedError::ExtractionFailed(format!("invalid feed url: {e}")))?;

        let mut candidates = Vec::new();
        for entry in feed.entries {
            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            let resolved = base
                .join(&link)
                .map(|u| u.to_string())
                .unwrap_or(link);

            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "(untitled)".to_string());

            let raw_content = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            // `content:encoded`/`description`/`summary` carry HTML, same as a
            // Tier-2 article body; run it through the same cleaner so the
            // Processor sees plain text either way (§4.C "Sanitize each
            // candidate via Content Cleaner").
            let content = html_to_text(&raw_content);

            let published_at: Option<DateTime<Utc>> =
                entry.published.or(entry.updated).map(|d| d.with_timezone(&Utc));

            let author = entry.authors.first().map(|a| a.name.clone());
            let tags = entry.categories.into_iter().map(|c| c.term).collect();
            let needs_fulltext = content.chars().count() < FULLTEXT_MIN_CHARS;

            candidates.push(ArticleCandidate {
                source_id,
                original_url: resolved,
                title,
                content,
                raw_html: None,
                published_at,
                author,
                tags,
                language: None,
                needs_fulltext,
            });
        }

        Ok(RssFetchOutcome {
            candidates,
            http_status,
            etag: out_etag,
            last_modified: out_last_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulltext_threshold_matches_spec_value() {
        assert_eq!(FULLTEXT_MIN_CHARS, 400);
    }
}
