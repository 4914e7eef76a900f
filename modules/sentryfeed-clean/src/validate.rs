//! Field validation and garbage/corruption detection (§4.B `validate`,
//! `is_garbage`).

use std::collections::HashMap;

use sentryfeed_common::Scope;

const MIN_TITLE_LEN: usize = 5;
const MAX_TITLE_LEN: usize = 500;
const MIN_CONTENT_LEN: usize = 50;
const REPLACEMENT_CHAR: char = '\u{FFFD}';

const EXTRACTION_FAILED_MARKERS: &[&str] = &[
    "content not available",
    "access denied",
    "please enable javascript",
    "403 forbidden",
    "rate limit exceeded",
    "compression error",
    "proxy error",
];

/// Validate a candidate article's title/content/URL per §4.B. Returns the
/// list of validation issues; an empty list means the candidate passes.
pub fn validate(title: &str, content: &str, url: &str, scope: &Scope) -> Vec<String> {
    let mut issues = Vec::new();

    let title_len = title.chars().count();
    if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&title_len) {
        issues.push(format!(
            "title length {title_len} outside [{MIN_TITLE_LEN}, {MAX_TITLE_LEN}]"
        ));
    }

    if content.chars().count() < MIN_CONTENT_LEN {
        issues.push(format!(
            "content length {} below minimum {MIN_CONTENT_LEN}",
            content.chars().count()
        ));
    }

    match url::Url::parse(url) {
        Ok(parsed) => {
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                issues.push(format!("unsupported URL scheme: {}", parsed.scheme()));
            }

            let host = parsed.host_str().unwrap_or("");
            let matches_any = |patterns: &[String]| {
                patterns.iter().any(|p| regex::Regex::new(p).map(|re| re.is_match(host)).unwrap_or(false))
            };
            if matches_any(&scope.deny) {
                issues.push(format!("host {host} denied by source scope"));
            } else if !scope.allow.is_empty() && !matches_any(&scope.allow) {
                issues.push(format!("host {host} not in source scope"));
            }

            if let Some(pattern) = &scope.post_url_regex {
                let allowed = regex::Regex::new(pattern).map(|re| re.is_match(url)).unwrap_or(false);
                if !allowed {
                    issues.push(format!("url does not match post_url_regex: {pattern}"));
                }
            }
        }
        Err(e) => issues.push(format!("invalid URL: {e}")),
    }

    if is_garbage(content) {
        issues.push("content failed garbage/corruption detection".to_string());
    }

    issues
}

/// §4.B `is_garbage`: rejects text dominated by replacement characters,
/// long runs of control characters, known extraction-failure markers, or a
/// single token repeated past a dominance threshold.
pub fn is_garbage(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let total_chars = text.chars().count();
    let replacement_count = text.chars().filter(|c| *c == REPLACEMENT_CHAR).count();
    if total_chars > 0 && (replacement_count as f64 / total_chars as f64) > 0.08 {
        return true;
    }

    let mut consecutive_control = 0usize;
    for c in text.chars() {
        if c.is_control() && c != '\n' && c != '\t' && c != '\r' {
            consecutive_control += 1;
            if consecutive_control >= 3 {
                return true;
            }
        } else {
            consecutive_control = 0;
        }
    }

    let lower = text.to_lowercase();
    if EXTRACTION_FAILED_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }

    if text.len() > 200 {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if !tokens.is_empty() {
            for t in &tokens {
                *counts.entry(*t).or_insert(0) += 1;
            }
            if let Some(max_count) = counts.values().max() {
                if (*max_count as f64 / tokens.len() as f64) > 0.25 {
                    return true;
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_title_too_short() {
        let issues = validate("Hi", "this content is long enough to pass the minimum length check easily", "https://example.com/a", &Scope::default());
        assert!(issues.iter().any(|i| i.contains("title length")));
    }

    #[test]
    fn rejects_content_too_short() {
        let issues = validate("A reasonable title here", "short", "https://example.com/a", &Scope::default());
        assert!(issues.iter().any(|i| i.contains("content length")));
    }

    #[test]
    fn accepts_valid_candidate() {
        let issues = validate(
            "A reasonable article title",
            "This is a sufficiently long body of content that should pass validation checks easily without issue.",
            "https://example.com/a",
            &Scope::default(),
        );
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn rejects_url_out_of_scope() {
        let scope = Scope {
            allow: vec!["^example\\.com$".to_string()],
            ..Scope::default()
        };
        let issues = validate(
            "A reasonable article title",
            "This is a sufficiently long body of content that should pass validation checks easily without issue.",
            "https://evil.test/a",
            &scope,
        );
        assert!(issues.iter().any(|i| i.contains("not in source scope")));
    }

    #[test]
    fn rejects_url_denied_even_if_allowed() {
        let scope = Scope {
            allow: vec![".*".to_string()],
            deny: vec!["^evil\\.test$".to_string()],
            post_url_regex: None,
        };
        let issues = validate(
            "A reasonable article title",
            "This is a sufficiently long body of content that should pass validation checks easily without issue.",
            "https://evil.test/a",
            &scope,
        );
        assert!(issues.iter().any(|i| i.contains("denied by source scope")));
    }

    #[test]
    fn rejects_url_not_matching_post_url_regex() {
        let scope = Scope {
            post_url_regex: Some(r"/articles/\d+$".to_string()),
            ..Scope::default()
        };
        let issues = validate(
            "A reasonable article title",
            "This is a sufficiently long body of content that should pass validation checks easily without issue.",
            "https://example.com/about",
            &scope,
        );
        assert!(issues.iter().any(|i| i.contains("post_url_regex")));
    }

    #[test]
    fn garbage_detects_replacement_char_flood() {
        let text = "\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}ok";
        assert!(is_garbage(text));
    }

    #[test]
    fn garbage_detects_extraction_failed_marker() {
        assert!(is_garbage("Sorry, Content Not Available in your region."));
    }

    #[test]
    fn garbage_detects_repeated_token_dominance() {
        let text = "spam ".repeat(60);
        assert!(is_garbage(&text));
    }

    #[test]
    fn normal_prose_is_not_garbage() {
        let text = "The quarterly report outlines revenue growth, customer acquisition costs, and a forward-looking strategy for the next fiscal year.";
        assert!(!is_garbage(text));
    }
}
