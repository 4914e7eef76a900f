//! Fetcher orchestrator (§4.F): claims a source, picks its tier, discovers
//! candidate URLs, and hands each through to the Processor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use sentryfeed_common::{
    ArticleCandidate, Health, HealthTransition, NoopNotifier, Notifier, ProcessOutcome,
    SentryFeedError, Source, SourceCheck, Tier,
};
use sentryfeed_http::HttpClient;
use sentryfeed_store::Store;
use tracing::{info, warn};
use uuid::Uuid;

use crate::legacy::LegacyParser;
use crate::modern::ModernScraper;
use crate::rss::RssParser;

/// Implemented by whatever hands candidates to the Processor pipeline
/// (`sentryfeed-process::Processor` in production, a mock in tests).
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn process(&self, candidate: ArticleCandidate) -> sentryfeed_common::Result<ProcessOutcome>;
}

/// Bounded intra-source concurrency for candidate URLs within a single
/// `check_source` call (§4.J, §5).
pub const DEFAULT_INTRA_SOURCE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct SourceCheckResult {
    pub articles_seen: u32,
    pub articles_new: u32,
    pub error_kind: Option<String>,
    pub http_status: Option<u16>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Conditional-fetch metadata a tier discovery pass hands back to `run_check`
/// (§4.F "on success, capture new ETag/Last-Modified"). Only the RSS tier
/// currently does conditional fetching, so Tier 2/3 report `None` and leave
/// the source's existing validators untouched.
#[derive(Debug, Clone, Default)]
struct TierFetchMeta {
    http_status: Option<u16>,
    etag: Option<String>,
    last_modified: Option<String>,
}

pub struct Fetcher<'a> {
    client: &'a HttpClient,
    store: &'a Store,
    worker_id: String,
    notifier: Arc<dyn Notifier>,
    default_timeout_seconds: u64,
}

impl<'a> Fetcher<'a> {
    pub fn new(client: &'a HttpClient, store: &'a Store, worker_id: impl Into<String>) -> Self {
        Self {
            client,
            store,
            worker_id: worker_id.into(),
            notifier: Arc::new(NoopNotifier),
            default_timeout_seconds: 30,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Falls back to `config.request_timeout_seconds` when a source carries
    /// no `http_overrides.timeout_seconds` of its own.
    pub fn with_default_timeout(mut self, seconds: u64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    fn timeout_for(&self, source: &Source) -> Option<u64> {
        Some(source.http_overrides.timeout_seconds.unwrap_or(self.default_timeout_seconds))
    }

    pub async fn check_source(
        &self,
        source: &Source,
        sink: &dyn ArticleSink,
    ) -> sentryfeed_common::Result<SourceCheckResult> {
        self.check_source_with_force(source, sink, false).await
    }

    /// `force = true` bypasses Tier-1 conditional headers, re-fetching the
    /// feed in full even if the source believes nothing has changed.
    pub async fn check_source_with_force(
        &self,
        source: &Source,
        sink: &dyn ArticleSink,
        force: bool,
    ) -> sentryfeed_common::Result<SourceCheckResult> {
        if !self.store.try_claim(source.id, &self.worker_id).await.map_err(anyhow::Error::from)? {
            return Err(SentryFeedError::ConcurrentExecutionBlocked(source.id));
        }

        let result = self.run_check(source, sink, force).await;
        self.store.release(source.id).await.map_err(anyhow::Error::from)?;
        result
    }

    async fn run_check(
        &self,
        source: &Source,
        sink: &dyn ArticleSink,
        force: bool,
    ) -> sentryfeed_common::Result<SourceCheckResult> {
        let check = SourceCheck::started(source.id);
        self.store.start_check(&check).await.map_err(anyhow::Error::from)?;

        let state = self.store.get_source_state(source.id).await.map_err(anyhow::Error::from)?;

        let fetch_result = self.discover_and_process(source, &state, sink, force).await;

        match &fetch_result {
            Ok(result) => {
                let next_run = next_run_at(source.check_frequency_seconds);
                // A tier that doesn't do conditional fetching reports `None`;
                // keep whatever validators the source already had rather than
                // wiping them out.
                let etag = result.etag.clone().or_else(|| state.last_etag.clone());
                let last_modified = result.last_modified.clone().or_else(|| state.last_modified.clone());
                self.store
                    .record_check_success(source.id, etag.as_deref(), last_modified.as_deref(), next_run)
                    .await
                    .map_err(anyhow::Error::from)?;
                self.store
                    .finish_check(check.id, result.http_status, None, result.articles_seen, result.articles_new, None, None)
                    .await
                    .map_err(anyhow::Error::from)?;
                info!(source = %source.identifier, seen = result.articles_seen, new = result.articles_new, "source check complete");
                self.notify_health_change(source, state.health, Health::Healthy).await;
            }
            Err(e) => {
                let backoff_secs = (source.check_frequency_seconds as f64 * 2f64.powi(state.consecutive_failures as i32))
                    .min(Duration::hours(24).num_seconds() as f64) as i64;
                let next_run = Utc::now() + Duration::seconds(backoff_secs);
                let health = self
                    .store
                    .record_check_failure(source.id, next_run)
                    .await
                    .map_err(anyhow::Error::from)?;
                self.store
                    .finish_check(check.id, None, None, 0, 0, Some(e.kind()), Some(&e.to_string()))
                    .await
                    .map_err(anyhow::Error::from)?;
                warn!(source = %source.identifier, error = %e, ?health, "source check failed");
                self.notify_health_change(source, state.health, health).await;
            }
        }

        fetch_result
    }

    async fn notify_health_change(&self, source: &Source, from: Health, to: Health) {
        if from == to {
            return;
        }
        let transition = HealthTransition {
            source_identifier: source.identifier.clone(),
            from,
            to,
        };
        if let Err(e) = self.notifier.notify_health_transition(&transition).await {
            warn!(source = %source.identifier, error = %e, "notifier failed");
        }
    }

    async fn discover_and_process(
        &self,
        source: &Source,
        state: &sentryfeed_common::SourceState,
        sink: &dyn ArticleSink,
        force: bool,
    ) -> sentryfeed_common::Result<SourceCheckResult> {
        let (mut candidates, fetch_meta) = self.discover_candidates(source, state, force).await?;

        if let Some(max_articles) = source.http_overrides.max_articles {
            let max_articles = max_articles as usize;
            if candidates.len() > max_articles {
                info!(
                    source = %source.identifier,
                    dropped = candidates.len() - max_articles,
                    max_articles,
                    "capping candidates to per-source max_articles override"
                );
                candidates.truncate(max_articles);
            }
        }

        let mut articles_seen = 0u32;
        let mut articles_new = 0u32;

        // Candidates keep discovery order (§5 "URLs processed in discovery
        // order") but run with bounded intra-source concurrency (§4.J):
        // `buffered` drives up to `DEFAULT_INTRA_SOURCE_CONCURRENCY` futures
        // at once while still yielding results in the original order.
        let results: Vec<Option<bool>> = stream::iter(candidates.into_iter().map(|candidate| {
            let source = &*source;
            async move {
                let canonical = match sentryfeed_common::url_norm::normalize(&candidate.original_url) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(url = %candidate.original_url, error = %e, "skipping candidate with unnormalizable url");
                        return Ok(None);
                    }
                };

                let already_tracked = self
                    .store
                    .lookup_url_tracking(source.id, &canonical)
                    .await
                    .map_err(anyhow::Error::from)?
                    .is_some();
                if already_tracked {
                    return Ok(None);
                }

                let candidate = self
                    .follow_up_fulltext(source, candidate)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "tier-2 follow-up failed, keeping teaser body");
                        None
                    })
                    .unwrap_or(candidate);

                match sink.process(candidate).await {
                    Ok(ProcessOutcome::Stored(_)) => Ok(Some(true)),
                    Ok(ProcessOutcome::Duplicate { .. }) => Ok(Some(false)),
                    Ok(ProcessOutcome::Rejected(reason)) => {
                        info!(source = %source.identifier, reason, "candidate rejected by processor");
                        Ok(Some(false))
                    }
                    Err(e) => {
                        warn!(source = %source.identifier, error = %e, "processor error for candidate");
                        Ok(Some(false))
                    }
                }
            }
        }))
        .buffered(DEFAULT_INTRA_SOURCE_CONCURRENCY)
        .map(|r: sentryfeed_common::Result<Option<bool>>| r.unwrap_or(None))
        .collect()
        .await;

        for outcome in results {
            articles_seen += 1;
            if outcome == Some(true) {
                articles_new += 1;
            }
        }

        Ok(SourceCheckResult {
            articles_seen,
            articles_new,
            error_kind: None,
            http_status: fetch_meta.http_status,
            etag: fetch_meta.etag,
            last_modified: fetch_meta.last_modified,
        })
    }

    async fn discover_candidates(
        &self,
        source: &Source,
        state: &sentryfeed_common::SourceState,
        force: bool,
    ) -> sentryfeed_common::Result<(Vec<ArticleCandidate>, TierFetchMeta)> {
        match source.effective_tier() {
            Tier::Rss => {
                let feed_url = source
                    .rss_url
                    .as_deref()
                    .ok_or_else(|| SentryFeedError::Fatal("rss tier without rss_url".to_string()))?;
                let parser = RssParser::new(self.client);
                let (etag, last_modified) = if force {
                    (None, None)
                } else {
                    (state.last_etag.as_deref(), state.last_modified.as_deref())
                };
                let outcome = parser
                    .parse(
                        source.id,
                        feed_url,
                        source.rate_limit_per_minute,
                        &source.scope,
                        etag,
                        last_modified,
                        source.user_agent_override.as_deref(),
                        self.timeout_for(source),
                    )
                    .await?;
                Ok((
                    outcome.candidates,
                    TierFetchMeta {
                        http_status: Some(outcome.http_status),
                        etag: outcome.etag,
                        last_modified: outcome.last_modified,
                    },
                ))
            }
            Tier::Modern => {
                let scraper = ModernScraper::new(self.client);
                let mut article_urls = Vec::new();
                for listing_url in &source.discovery_hints.listing_urls {
                    let Some(selector) = source.discovery_hints.post_link_selector.as_deref() else {
                        warn!(url = listing_url, "tier-2 source has no post_link_selector, skipping listing");
                        continue;
                    };
                    match scraper
                        .discover_links(
                            listing_url,
                            source.rate_limit_per_minute,
                            &source.scope,
                            selector,
                            source.discovery_hints.max_pages,
                            source.user_agent_override.as_deref(),
                            self.timeout_for(source),
                        )
                        .await
                    {
                        Ok(links) => article_urls.extend(links),
                        Err(e) => warn!(url = listing_url, error = %e, "tier-2 listing discovery failed"),
                    }
                }
                article_urls.sort();
                article_urls.dedup();

                let mut out = Vec::new();
                for article_url in &article_urls {
                    match scraper
                        .extract(
                            source.id,
                            article_url,
                            source.rate_limit_per_minute,
                            &source.scope,
                            &source.extract_hints,
                            source.user_agent_override.as_deref(),
                            self.timeout_for(source),
                        )
                        .await
                    {
                        Ok(candidate) => out.push(candidate),
                        Err(e) => warn!(url = article_url, error = %e, "tier-2 extraction failed"),
                    }
                }
                Ok((out, TierFetchMeta::default()))
            }
            Tier::Legacy => {
                let parser = LegacyParser::new(self.client);
                match parser
                    .extract(
                        source.id,
                        &source.url,
                        source.rate_limit_per_minute,
                        &source.scope,
                        source.user_agent_override.as_deref(),
                        self.timeout_for(source),
                    )
                    .await
                {
                    Ok(candidate) => {
                        if let Some(html) = &candidate.raw_html {
                            let feeds = crate::modern::discover_feed_urls(html, &source.url);
                            if !feeds.is_empty() {
                                info!(
                                    source = %source.identifier,
                                    feeds = ?feeds,
                                    "legacy source advertises a feed; consider switching its tier"
                                );
                            }
                        }
                        Ok((vec![candidate], TierFetchMeta::default()))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Tier-1 candidates with a short/absent body are re-extracted through
    /// Tier 2 on their linked URL (§4.C).
    async fn follow_up_fulltext(
        &self,
        source: &Source,
        candidate: ArticleCandidate,
    ) -> sentryfeed_common::Result<Option<ArticleCandidate>> {
        if !candidate.needs_fulltext {
            return Ok(None);
        }
        let scraper = ModernScraper::new(self.client);
        let full = scraper
            .extract(
                source.id,
                &candidate.original_url,
                source.rate_limit_per_minute,
                &source.scope,
                &source.extract_hints,
                source.user_agent_override.as_deref(),
                self.timeout_for(source),
            )
            .await?;
        Ok(Some(full))
    }
}

/// `next_run_at = now + check_frequency + jitter(±10%)` (§4.F).
fn next_run_at(check_frequency_seconds: i64) -> chrono::DateTime<Utc> {
    let jitter_range = check_frequency_seconds as f64 * 0.10;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
    Utc::now() + Duration::seconds((check_frequency_seconds as f64 + jitter) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_run_at_stays_within_jitter_band() {
        let base = Utc::now();
        let at = next_run_at(1800);
        let delta = (at - base).num_seconds();
        assert!(delta >= (1800 * 9 / 10) as i64 && delta <= (1800 * 11 / 10) as i64, "delta={delta}");
    }
}
