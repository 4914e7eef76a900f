use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{DiscoveryHints, ExtractHints, HttpOverrides, Scope, Source, Tier};

/// One entry in the on-disk source catalog document (§6 "Source configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfigEntry {
    pub identifier: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub rss_url: Option<String>,
    #[serde(default)]
    pub tier: Option<u8>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_check_frequency")]
    pub check_frequency: i64,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub scope: CatalogScope,
    #[serde(default)]
    pub discovery: CatalogDiscovery,
    #[serde(default)]
    pub extract: CatalogExtract,
    #[serde(default)]
    pub categories: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}
fn default_active() -> bool {
    true
}
fn default_check_frequency() -> i64 {
    1800
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogScope {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub post_url_regex: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDiscovery {
    #[serde(default)]
    pub listing_urls: Vec<String>,
    #[serde(default)]
    pub post_link_selector: Option<String>,
    #[serde(default)]
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogExtract {
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

/// Top-level catalog document: a flat list of sources plus configurable
/// threat-hunting keyword lists (spec §9 open question: these must be
/// loaded from configuration, never hardcoded).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub sources: Vec<SourceConfigEntry>,
    #[serde(default)]
    pub discriminators: DiscriminatorLists,
}

/// Configurable keyword sets consumed by the threat-hunting scorer (§4.G.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscriminatorLists {
    #[serde(default)]
    pub perfect: Vec<String>,
    #[serde(default)]
    pub lolbas: Vec<String>,
    #[serde(default)]
    pub good: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate source identifier: {0}")]
    DuplicateIdentifier(String),
    #[error("source {identifier}: invalid regex in {field}: {detail}")]
    InvalidRegex {
        identifier: String,
        field: String,
        detail: String,
    },
    #[error("source {identifier}: invalid url: {detail}")]
    InvalidUrl { identifier: String, detail: String },
    #[error("source {identifier}: tier/hints inconsistent (tier 2/3 requires rss_url or discovery.listing_urls, otherwise tier must be 3)")]
    TierInconsistent { identifier: String },
    #[error(transparent)]
    Parse(#[from] serde_yml::Error),
}

pub fn parse_catalog(yaml: &str) -> Result<SourceCatalog, CatalogError> {
    let catalog: SourceCatalog = serde_yml::from_str(yaml)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &SourceCatalog) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for entry in &catalog.sources {
        if !seen.insert(entry.identifier.clone()) {
            return Err(CatalogError::DuplicateIdentifier(entry.identifier.clone()));
        }
        if url::Url::parse(&entry.url).is_err() {
            return Err(CatalogError::InvalidUrl {
                identifier: entry.identifier.clone(),
                detail: "not a valid absolute URL".to_string(),
            });
        }
        for (field, pattern) in [
            ("scope.allow", entry.scope.allow.join("|")),
            ("scope.deny", entry.scope.deny.join("|")),
        ] {
            if pattern.is_empty() {
                continue;
            }
            if regex::Regex::new(&pattern).is_err() {
                return Err(CatalogError::InvalidRegex {
                    identifier: entry.identifier.clone(),
                    field: field.to_string(),
                    detail: "invalid regex alternation".to_string(),
                });
            }
        }
        if let Some(re) = &entry.scope.post_url_regex {
            if regex::Regex::new(re).is_err() {
                return Err(CatalogError::InvalidRegex {
                    identifier: entry.identifier.clone(),
                    field: "scope.post_url_regex".to_string(),
                    detail: "invalid regex".to_string(),
                });
            }
        }
        let has_rss = entry.rss_url.is_some();
        let has_discovery = !entry.discovery.listing_urls.is_empty();
        let declared_tier = entry.tier.unwrap_or(if has_rss {
            1
        } else if has_discovery {
            2
        } else {
            3
        });
        if !has_rss && !has_discovery && declared_tier != 3 {
            return Err(CatalogError::TierInconsistent {
                identifier: entry.identifier.clone(),
            });
        }
    }
    Ok(())
}

impl From<&SourceConfigEntry> for Source {
    fn from(entry: &SourceConfigEntry) -> Self {
        let has_rss = entry.rss_url.is_some();
        let has_discovery = !entry.discovery.listing_urls.is_empty();
        let tier = match entry.tier {
            Some(1) => Tier::Rss,
            Some(2) => Tier::Modern,
            Some(3) => Tier::Legacy,
            _ if has_rss => Tier::Rss,
            _ if has_discovery => Tier::Modern,
            _ => Tier::Legacy,
        };
        Source {
            id: uuid::Uuid::new_v4(),
            identifier: entry.identifier.clone(),
            name: entry.name.clone(),
            url: entry.url.clone(),
            rss_url: entry.rss_url.clone(),
            tier,
            active: entry.active,
            weight: entry.weight,
            check_frequency_seconds: entry.check_frequency,
            rate_limit_per_minute: entry.rate_limit_per_minute.unwrap_or(20),
            user_agent_override: None,
            scope: Scope {
                allow: entry.scope.allow.clone(),
                deny: entry.scope.deny.clone(),
                post_url_regex: entry.scope.post_url_regex.clone(),
            },
            extract_hints: ExtractHints {
                prefer_jsonld: entry.extract.prefer_jsonld,
                title_selectors: entry.extract.title_selectors.clone(),
                date_selectors: entry.extract.date_selectors.clone(),
                body_selectors: entry.extract.body_selectors.clone(),
                author_selectors: entry.extract.author_selectors.clone(),
            },
            discovery_hints: DiscoveryHints {
                listing_urls: entry.discovery.listing_urls.clone(),
                post_link_selector: entry.discovery.post_link_selector.clone(),
                max_pages: entry.discovery.max_pages,
            },
            categories: entry.categories.clone(),
            http_overrides: HttpOverrides::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_identifiers() {
        let yaml = r#"
sources:
  - identifier: a
    name: A
    url: https://a.example/
  - identifier: a
    name: A2
    url: https://a2.example/
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateIdentifier(id) if id == "a"));
    }

    #[test]
    fn rejects_tier_3_implicit_without_hints_when_tier_forced_to_2() {
        let yaml = r#"
sources:
  - identifier: a
    name: A
    url: https://a.example/
    tier: 2
"#;
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, CatalogError::TierInconsistent { .. }));
    }

    #[test]
    fn accepts_minimal_legacy_source() {
        let yaml = r#"
sources:
  - identifier: a
    name: A
    url: https://a.example/
"#;
        let catalog = parse_catalog(yaml).unwrap();
        assert_eq!(catalog.sources.len(), 1);
        let source: Source = (&catalog.sources[0]).into();
        assert_eq!(source.effective_tier(), crate::types::Tier::Legacy);
    }

    #[test]
    fn discriminator_lists_default_empty_and_round_trip() {
        let yaml = r#"
sources: []
discriminators:
  perfect: ["rundll32.exe"]
  lolbas: ["certutil.exe"]
  good: ["powershell"]
"#;
        let catalog = parse_catalog(yaml).unwrap();
        assert_eq!(catalog.discriminators.perfect, vec!["rundll32.exe"]);
        assert_eq!(catalog.discriminators.lolbas, vec!["certutil.exe"]);
    }
}
