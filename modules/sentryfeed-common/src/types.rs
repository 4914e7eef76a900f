use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Which extraction tier applies to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Rss = 1,
    Modern = 2,
    Legacy = 3,
}

impl Tier {
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

/// Host allow/deny scope for a source, plus an optional post-URL regex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub post_url_regex: Option<String>,
}

/// Selector hints used by the Modern Scraper (Tier 2) and as a fallback for
/// the Legacy Parser (Tier 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractHints {
    #[serde(default)]
    pub prefer_jsonld: bool,
    #[serde(default)]
    pub title_selectors: Vec<String>,
    #[serde(default)]
    pub date_selectors: Vec<String>,
    #[serde(default)]
    pub body_selectors: Vec<String>,
    #[serde(default)]
    pub author_selectors: Vec<String>,
}

/// Listing-page discovery hints used by the Modern Scraper (Tier 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryHints {
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub post_link_selector: Option<String>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// Per-source HTTP overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpOverrides {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub max_articles: Option<u32>,
}

/// A polling target (§3 `Source`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub identifier: String,
    pub name: String,
    pub url: String,
    pub rss_url: Option<String>,
    pub tier: Tier,
    pub active: bool,
    pub weight: f64,
    pub check_frequency_seconds: i64,
    pub rate_limit_per_minute: u32,
    pub user_agent_override: Option<String>,
    pub scope: Scope,
    pub extract_hints: ExtractHints,
    pub discovery_hints: DiscoveryHints,
    pub categories: Vec<String>,
    pub http_overrides: HttpOverrides,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: String::new(),
            name: String::new(),
            url: String::new(),
            rss_url: None,
            tier: Tier::Legacy,
            active: true,
            weight: 1.0,
            check_frequency_seconds: 1800,
            rate_limit_per_minute: 20,
            user_agent_override: None,
            scope: Scope::default(),
            extract_hints: ExtractHints::default(),
            discovery_hints: DiscoveryHints::default(),
            categories: Vec::new(),
            http_overrides: HttpOverrides::default(),
        }
    }
}

impl Source {
    /// §3 invariant: if `rss_url` and `discovery_hints` are both absent, tier must be Legacy.
    pub fn tier_consistent(&self) -> bool {
        if self.rss_url.is_some() {
            return true;
        }
        if !self.discovery_hints.listing_urls.is_empty() {
            return true;
        }
        self.tier == Tier::Legacy
    }

    /// Effective tier after presence of `rss_url` overrides any config hint.
    pub fn effective_tier(&self) -> Tier {
        if self.rss_url.is_some() {
            Tier::Rss
        } else if !self.discovery_hints.listing_urls.is_empty() {
            Tier::Modern
        } else {
            Tier::Legacy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    DisabledAuto,
}

impl Health {
    /// §3 invariant: `consecutive_failures >= 5 => degraded`, `>= 20 => disabled_auto`.
    pub fn from_failures(consecutive_failures: u32) -> Self {
        if consecutive_failures >= 20 {
            Health::DisabledAuto
        } else if consecutive_failures >= 5 {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }
}

/// Per-source scheduling and conditional-fetch state, owned 1:1 by `Source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    pub source_id: Uuid,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_etag: Option<String>,
    pub last_modified: Option<String>,
    pub consecutive_failures: u32,
    pub health: Health,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl SourceState {
    pub fn new(source_id: Uuid) -> Self {
        Self {
            source_id,
            last_checked_at: None,
            last_success_at: None,
            last_etag: None,
            last_modified: None,
            consecutive_failures: 0,
            health: Health::Healthy,
            next_run_at: None,
        }
    }
}

/// Threat-hunting score detail, stored in `Article.metadata.threat_hunting`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatHuntingDetail {
    pub score: u32,
    pub perfect_matches: Vec<String>,
    pub lolbas_matches: Vec<String>,
    pub good_matches: Vec<String>,
    pub technical_depth: u32,
}

/// The canonical ingested record (§3 `Article`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub source_id: Uuid,
    pub canonical_url: String,
    pub original_url: String,
    pub title: String,
    pub content: String,
    pub raw_html: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub content_hash: String,
    pub simhash: u64,
    pub quality_score: f64,
    pub threat_hunting_score: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An extracted-but-not-yet-processed article, handed from Fetcher to Processor.
#[derive(Debug, Clone)]
pub struct ArticleCandidate {
    pub source_id: Uuid,
    pub original_url: String,
    pub title: String,
    pub content: String,
    pub raw_html: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    /// Tier 1 only: body was short/absent, fetcher should follow up with Tier 2.
    pub needs_fulltext: bool,
}

/// One row per fetch attempt (§3 `SourceCheck`). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCheck {
    pub id: Uuid,
    pub source_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub http_status: Option<u16>,
    pub bytes: Option<i64>,
    pub articles_seen: u32,
    pub articles_new: u32,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
}

impl SourceCheck {
    pub fn started(source_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            started_at: Utc::now(),
            finished_at: None,
            http_status: None,
            bytes: None,
            articles_seen: 0,
            articles_new: 0,
            error_kind: None,
            error_detail: None,
        }
    }
}

/// `(source_id, canonical_url) -> first_seen_at, last_seen_at, article_id?` (§3 `URLTracking`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlTracking {
    pub source_id: Uuid,
    pub canonical_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub article_id: Option<Uuid>,
}

/// Outcome of `Processor::process` (§4.G).
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Stored(Uuid),
    Duplicate { kind: DuplicateKindOwned, canonical_id: Uuid },
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKindOwned {
    Exact,
    Near,
}

/// Outbound workflow-trigger payload (§6 outbound contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub article_id: Uuid,
    pub reason: String,
    pub score: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkflowTrigger {
    pub fn threshold(article_id: Uuid, score: u32) -> Self {
        Self {
            article_id,
            reason: "threat_hunting_threshold".to_string(),
            score,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_thresholds_match_invariant() {
        assert_eq!(Health::from_failures(0), Health::Healthy);
        assert_eq!(Health::from_failures(4), Health::Healthy);
        assert_eq!(Health::from_failures(5), Health::Degraded);
        assert_eq!(Health::from_failures(19), Health::Degraded);
        assert_eq!(Health::from_failures(20), Health::DisabledAuto);
        assert_eq!(Health::from_failures(100), Health::DisabledAuto);
    }

    #[test]
    fn tier_consistency_requires_legacy_without_hints() {
        let mut s = Source::default();
        s.tier = Tier::Modern;
        assert!(!s.tier_consistent());
        s.tier = Tier::Legacy;
        assert!(s.tier_consistent());
        s.rss_url = Some("https://example.test/feed.xml".to_string());
        s.tier = Tier::Modern;
        assert!(s.tier_consistent());
    }

    #[test]
    fn effective_tier_prefers_rss_over_discovery_hints() {
        let mut s = Source::default();
        s.rss_url = Some("https://example.test/feed.xml".to_string());
        s.discovery_hints.listing_urls.push("https://example.test/news".to_string());
        assert_eq!(s.effective_tier(), Tier::Rss);
    }
}
