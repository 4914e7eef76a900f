//! Quality scoring (§4.G step 5): weighted combination of length, link
//! density, code presence, date freshness, and title informativeness.

use chrono::{DateTime, Utc};

/// Below this score, a candidate is rejected unless the source is trusted
/// (`weight > TRUSTED_WEIGHT_THRESHOLD`).
pub const QUALITY_REJECT_THRESHOLD: f64 = 0.3;
pub const TRUSTED_WEIGHT_THRESHOLD: f64 = 1.5;

const LENGTH_SATURATION_CHARS: f64 = 2000.0;
const FRESHNESS_HALF_LIFE_DAYS: f64 = 180.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "in", "on", "at", "to", "for", "with", "is", "are",
    "was", "were", "it", "this", "that", "as", "by", "from", "be", "has", "have",
];

pub struct QualityInput<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub published_at: Option<DateTime<Utc>>,
}

/// Returns a score in `[0, 1]`.
pub fn score(input: &QualityInput<'_>) -> f64 {
    let length = length_score(input.content);
    let link_density = inverse_link_density_score(input.content);
    let code = code_presence_score(input.content);
    let freshness = freshness_score(input.published_at);
    let title = title_informativeness_score(input.title);

    // Equal weighting across the five signals; no differential weighting
    // between them is called for.
    (length + link_density + code + freshness + title) / 5.0
}

fn length_score(content: &str) -> f64 {
    (content.chars().count() as f64 / LENGTH_SATURATION_CHARS).min(1.0)
}

/// The cleaned content renders links as `text (url)`; count parenthesized
/// URL groups as a proxy for link density, inverted so fewer links scores higher.
fn inverse_link_density_score(content: &str) -> f64 {
    let words = content.split_whitespace().count().max(1);
    let link_markers = content.matches("http://").count() + content.matches("https://").count();
    let density = link_markers as f64 / words as f64;
    (1.0 - density * 10.0).clamp(0.0, 1.0)
}

fn code_presence_score(content: &str) -> f64 {
    if content.contains("```") {
        1.0
    } else {
        0.0
    }
}

fn freshness_score(published_at: Option<DateTime<Utc>>) -> f64 {
    let Some(published_at) = published_at else {
        return 0.5;
    };
    let age_days = (Utc::now() - published_at).num_seconds() as f64 / 86_400.0;
    let age_days = age_days.max(0.0);
    0.5f64.powf(age_days / FRESHNESS_HALF_LIFE_DAYS)
}

fn title_informativeness_score(title: &str) -> f64 {
    let words: Vec<String> = title
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let non_stopword = words.iter().filter(|w| !STOPWORDS.contains(&w.as_str())).count();
    non_stopword as f64 / words.len() as f64
}

/// Whether a candidate with this score and source weight should be rejected.
pub fn should_reject(score: f64, source_weight: f64) -> bool {
    score < QUALITY_REJECT_THRESHOLD && source_weight <= TRUSTED_WEIGHT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_recent_technical_title_scores_well() {
        let content = "x".repeat(2500) + "\n```\ncode here\n```";
        let input = QualityInput {
            title: "Threat actor deploys novel rootkit against enterprise targets",
            content: &content,
            published_at: Some(Utc::now()),
        };
        assert!(score(&input) > 0.6, "score = {}", score(&input));
    }

    #[test]
    fn stopword_heavy_title_scores_low_informativeness() {
        assert!(title_informativeness_score("the a an of in") < 0.2);
    }

    #[test]
    fn freshness_halves_at_180_days() {
        let published = Utc::now() - chrono::Duration::days(180);
        let f = freshness_score(Some(published));
        assert!((f - 0.5).abs() < 0.02, "f = {f}");
    }

    #[test]
    fn trusted_source_rescues_low_score_from_rejection() {
        assert!(!should_reject(0.1, 2.0));
        assert!(should_reject(0.1, 1.0));
    }
}
