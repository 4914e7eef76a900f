//! robots.txt fetch, cache (24h), and disallow-path matching (§4.A).
//!
//! Hand-rolled rather than pulling in a robots-parsing crate for this one
//! narrow need.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
struct CachedRobots {
    rules: RobotsRules,
    fetched_at: Instant,
}

#[derive(Clone, Default)]
struct RobotsRules {
    /// disallow path prefixes that apply to our user-agent (or `*`)
    disallow: Vec<String>,
    allow: Vec<String>,
}

const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Default)]
pub struct RobotsCache {
    entries: Arc<Mutex<HashMap<String, CachedRobots>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `path` is allowed for `user_agent` at `origin`
    /// (scheme://host[:port]). A robots-fetch failure degrades to "allow"
    /// per §4.A ("Robots fetch failures degrade to allow").
    pub async fn is_allowed(
        &self,
        client: &reqwest::Client,
        origin: &str,
        path: &str,
        user_agent: &str,
    ) -> bool {
        let rules = self.get_or_fetch(client, origin, user_agent).await;
        match rules {
            Some(rules) => evaluate(&rules, path),
            None => true,
        }
    }

    async fn get_or_fetch(
        &self,
        client: &reqwest::Client,
        origin: &str,
        user_agent: &str,
    ) -> Option<RobotsRules> {
        {
            let guard = self.entries.lock().await;
            if let Some(entry) = guard.get(origin) {
                if entry.fetched_at.elapsed() < CACHE_TTL {
                    return Some(entry.rules.clone());
                }
            }
        }

        let url = format!("{origin}/robots.txt");
        let body = match client
            .get(&url)
            .header("User-Agent", user_agent)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            _ => None,
        };

        let rules = body.map(|text| parse_robots(&text, user_agent));
        if let Some(rules) = &rules {
            let mut guard = self.entries.lock().await;
            guard.insert(
                origin.to_string(),
                CachedRobots {
                    rules: rules.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        rules
    }
}

fn parse_robots(text: &str, user_agent: &str) -> RobotsRules {
    let mut rules = RobotsRules::default();
    let mut in_matching_group = false;
    let mut in_wildcard_group = false;
    let mut matching_rules = RobotsRules::default();
    let mut wildcard_rules = RobotsRules::default();
    let ua_lower = user_agent.to_lowercase();

    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().to_string();

        match key.as_str() {
            "user-agent" => {
                let agent = value.to_lowercase();
                in_matching_group = !agent.is_empty() && ua_lower.contains(&agent);
                in_wildcard_group = agent == "*";
            }
            "disallow" if in_matching_group => matching_rules.disallow.push(value),
            "allow" if in_matching_group => matching_rules.allow.push(value),
            "disallow" if in_wildcard_group => wildcard_rules.disallow.push(value),
            "allow" if in_wildcard_group => wildcard_rules.allow.push(value),
            _ => {}
        }
    }

    if !matching_rules.disallow.is_empty() || !matching_rules.allow.is_empty() {
        rules = matching_rules;
    } else {
        rules = wildcard_rules;
    }
    rules
}

fn evaluate(rules: &RobotsRules, path: &str) -> bool {
    let longest_disallow = rules
        .disallow
        .iter()
        .filter(|p| !p.is_empty() && path.starts_with(p.as_str()))
        .map(|p| p.len())
        .max();
    let longest_allow = rules
        .allow
        .iter()
        .filter(|p| !p.is_empty() && path.starts_with(p.as_str()))
        .map(|p| p.len())
        .max();

    match (longest_disallow, longest_allow) {
        (Some(d), Some(a)) => a >= d,
        (Some(_), None) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_path_blocks() {
        let rules = parse_robots("User-agent: *\nDisallow: /admin\n", "sentryfeed/0.1");
        assert!(!evaluate(&rules, "/admin/secret"));
        assert!(evaluate(&rules, "/news/article"));
    }

    #[test]
    fn more_specific_allow_overrides_disallow() {
        let rules = parse_robots(
            "User-agent: *\nDisallow: /private\nAllow: /private/public-ok\n",
            "sentryfeed/0.1",
        );
        assert!(evaluate(&rules, "/private/public-ok/page"));
        assert!(!evaluate(&rules, "/private/other"));
    }

    #[test]
    fn named_user_agent_group_takes_precedence_over_wildcard() {
        let text = "User-agent: *\nDisallow: /\nUser-agent: sentryfeed\nDisallow:\nAllow: /\n";
        let rules = parse_robots(text, "sentryfeed/0.1");
        assert!(evaluate(&rules, "/anything"));
    }

    #[test]
    fn empty_body_allows_everything() {
        let rules = parse_robots("", "sentryfeed/0.1");
        assert!(evaluate(&rules, "/whatever"));
    }
}
