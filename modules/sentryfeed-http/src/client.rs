//! Polite HTTP client (§4.A). Plain `reqwest` requests with retry/backoff
//! tuned to this pipeline's numbers: base 1s, factor 2, jitter ±25%, 4
//! attempts.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sentryfeed_common::error::SentryFeedError;
use sentryfeed_common::Scope;
use tracing::{info, warn};
use url::Url;

use crate::rate_limit::RateLimiter;
use crate::request_log::RequestLedger;
use crate::robots::RobotsCache;

const RETRY_BASE: Duration = Duration::from_millis(1000);
const RETRY_FACTOR: f64 = 2.0;
const RETRY_MAX_ATTEMPTS: u32 = 4;
const JITTER_FRACTION: f64 = 0.25;
const MAX_REDIRECTS: usize = 5;

pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub method: reqwest::Method,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub scope: &'a Scope,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub final_url: String,
    pub elapsed: Duration,
}

impl FetchResponse {
    pub fn etag(&self) -> Option<String> {
        self.headers
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn last_modified(&self) -> Option<String> {
        self.headers
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    rate_limiter: RateLimiter,
    robots: RobotsCache,
    request_log: RequestLedger,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self {
            inner,
            rate_limiter: RateLimiter::new(),
            robots: RobotsCache::new(),
            request_log: RequestLedger::new(),
            user_agent: user_agent.into(),
        }
    }

    /// Recent requests logged against `host`, for `stats` diagnostics
    /// (SPEC_FULL §0 supplemented feature 3). Scoped to this process's
    /// lifetime; empty for a CLI invocation that just started.
    pub async fn recent_requests(&self, host: &str) -> Vec<RequestLogEntry> {
        self.request_log.recent(host).await
    }

    /// Fetch `request.url`, applying rate limiting, robots.txt compliance,
    /// bounded manual redirect-following within source scope, and retry with
    /// backoff on transient failures.
    pub async fn fetch(
        &self,
        request: FetchRequest<'_>,
        rate_limit_per_minute: u32,
    ) -> Result<FetchResponse, SentryFeedError> {
        let start = Url::parse(request.url)
            .map_err(|e| SentryFeedError::Fatal(format!("invalid URL {}: {e}", request.url)))?;

        let mut current = start.clone();
        let mut redirects = 0usize;

        loop {
            let host = current
                .host_str()
                .ok_or_else(|| SentryFeedError::Fatal("URL has no host".to_string()))?
                .to_string();

            if !host_in_scope(&host, request.scope) {
                return Err(SentryFeedError::OutOfScope(host));
            }

            let origin = format!(
                "{}://{}{}",
                current.scheme(),
                host,
                current
                    .port()
                    .map(|p| format!(":{p}"))
                    .unwrap_or_default()
            );
            let allowed = self
                .robots
                .is_allowed(&self.inner, &origin, current.path(), &self.user_agent)
                .await;
            if !allowed {
                return Err(SentryFeedError::RobotsDisallowed(current.to_string()));
            }

            if !self
                .rate_limiter
                .acquire(&host, rate_limit_per_minute, Duration::from_secs(30))
                .await
            {
                return Err(SentryFeedError::RateLimitedLocal(host));
            }

            let started = Instant::now();
            let response = self
                .fetch_with_retries(current.as_str(), &request)
                .await;
            self.request_log
                .record(&host, current.as_str(), response.as_ref().ok().map(|r| r.status), started.elapsed())
                .await;
            let response = response?;

            // 304 is a 3xx status but is the expected, non-redirect outcome
            // of a conditional request (§4.A "304 returns empty body with
            // status") — it must flow through to the caller, not be
            // followed as a redirect.
            if (300..400).contains(&response.status) && response.status != 304 {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(SentryFeedError::Fatal(format!(
                        "too many redirects from {}",
                        request.url
                    )));
                }
                let location = response
                    .headers
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| SentryFeedError::Fatal("redirect with no Location".to_string()))?;
                current = current
                    .join(location)
                    .map_err(|e| SentryFeedError::Fatal(format!("bad redirect target: {e}")))?;
                continue;
            }

            return Ok(response.into_final(current.to_string()));
        }
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        request: &FetchRequest<'_>,
    ) -> Result<RawStatusResponse, SentryFeedError> {
        for attempt in 0..RETRY_MAX_ATTEMPTS {
            let started = std::time::Instant::now();
            let result = self.do_request(url, request).await;
            match result {
                Ok(resp) => {
                    let status = reqwest::StatusCode::from_u16(resp.status)
                        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                    if status.as_u16() == 429 || status.is_server_error() {
                        if attempt + 1 < RETRY_MAX_ATTEMPTS {
                            let wait = retry_after(&resp.headers).unwrap_or_else(|| backoff_duration(attempt));
                            warn!(url, attempt = attempt + 1, status = status.as_u16(), "retrying after transient HTTP error");
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                        if status.as_u16() == 429 {
                            return Err(SentryFeedError::RateLimitedRemote(url.to_string()));
                        }
                        return Err(SentryFeedError::Http5xx {
                            status: status.as_u16(),
                            detail: url.to_string(),
                        });
                    }
                    if status.is_client_error()
                        && !matches!(status.as_u16(), 304 | 401 | 403 | 404 | 410)
                    {
                        return Err(SentryFeedError::Http4xx {
                            status: status.as_u16(),
                            detail: url.to_string(),
                        });
                    }
                    if matches!(status.as_u16(), 401 | 403 | 404 | 410) {
                        return Err(SentryFeedError::Http4xx {
                            status: status.as_u16(),
                            detail: url.to_string(),
                        });
                    }
                    info!(url, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "fetched");
                    return Ok(resp);
                }
                Err(e) if attempt + 1 < RETRY_MAX_ATTEMPTS => {
                    warn!(url, attempt = attempt + 1, error = %e, "retrying after network error");
                    tokio::time::sleep(backoff_duration(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns within RETRY_MAX_ATTEMPTS attempts")
    }

    async fn do_request(
        &self,
        url: &str,
        request: &FetchRequest<'_>,
    ) -> Result<RawStatusResponse, SentryFeedError> {
        let mut builder = self.inner.request(request.method.clone(), url).timeout(request.timeout);

        // A source's `user_agent_override` arrives as a `User-Agent` entry in
        // `request.headers`, which wins over the client-wide default.
        if !request.headers.contains_key(reqwest::header::USER_AGENT) {
            builder = builder.header("User-Agent", self.user_agent.clone());
        }

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(etag) = request.if_none_match {
            builder = builder.header("If-None-Match", etag);
        }
        if let Some(lm) = request.if_modified_since {
            builder = builder.header("If-Modified-Since", lm);
        }

        let resp = builder.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(classify_reqwest_error)?.to_vec();

        Ok(RawStatusResponse {
            status,
            headers,
            body,
        })
    }
}

struct RawStatusResponse {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawStatusResponse {
    fn into_final(self, final_url: String) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
            final_url,
            elapsed: Duration::from_millis(0),
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> SentryFeedError {
    if e.is_timeout() {
        SentryFeedError::Timeout(e.to_string())
    } else if e.is_connect() {
        SentryFeedError::Network(e.to_string())
    } else {
        SentryFeedError::Network(e.to_string())
    }
}

fn backoff_duration(attempt: u32) -> Duration {
    let base = RETRY_BASE.as_secs_f64() * RETRY_FACTOR.powi(attempt as i32);
    let jitter_range = base * JITTER_FRACTION;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((base + jitter).max(0.0))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date: DateTime<Utc> = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let now = Utc::now();
    let diff = (date - now).num_seconds();
    if diff > 0 {
        Some(Duration::from_secs(diff as u64))
    } else {
        Some(Duration::from_secs(0))
    }
}

/// §3 Source `scope`: deny wins over allow; an empty allow list permits any
/// host not explicitly denied.
fn host_in_scope(host: &str, scope: &Scope) -> bool {
    let matches_any = |patterns: &[String]| {
        patterns.iter().any(|pattern| {
            regex::Regex::new(pattern)
                .map(|re| re.is_match(host))
                .unwrap_or(false)
        })
    };
    if matches_any(&scope.deny) {
        return false;
    }
    scope.allow.is_empty() || matches_any(&scope.allow)
}

pub fn default_headers() -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(
        HeaderName::from_static("accept"),
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml,application/rss+xml,application/atom+xml"),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_by_factor_2_within_jitter_band() {
        for attempt in 0..4 {
            let d = backoff_duration(attempt);
            let base = 1.0 * 2f64.powi(attempt as i32);
            let lo = base * 0.75;
            let hi = base * 1.25;
            let secs = d.as_secs_f64();
            assert!(secs >= lo - 0.001 && secs <= hi + 0.001, "attempt {attempt}: {secs} not in [{lo},{hi}]");
        }
    }

    #[test]
    fn host_scope_empty_scope_permits_all() {
        assert!(host_in_scope("anything.example", &Scope::default()));
    }

    #[test]
    fn host_scope_respects_allow_regex() {
        let scope = Scope {
            allow: vec![r"^([a-z0-9-]+\.)?example\.com$".to_string()],
            ..Scope::default()
        };
        assert!(host_in_scope("example.com", &scope));
        assert!(host_in_scope("blog.example.com", &scope));
        assert!(!host_in_scope("evil.test", &scope));
    }

    #[test]
    fn host_scope_deny_overrides_allow() {
        let scope = Scope {
            allow: vec![r".*".to_string()],
            deny: vec![r"^evil\.example\.com$".to_string()],
            post_url_regex: None,
        };
        assert!(host_in_scope("ok.example.com", &scope));
        assert!(!host_in_scope("evil.example.com", &scope));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));
    }
}
