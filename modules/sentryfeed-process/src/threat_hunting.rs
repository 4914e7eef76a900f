//! Threat-hunting scoring (§4.G step 6): additive score from discriminator
//! keyword tiers plus a technical-depth bonus, capped at 100.

use regex::Regex;
use sentryfeed_common::{DiscriminatorLists, ThreatHuntingDetail};
use std::sync::OnceLock;

const PERFECT_WEIGHT: u32 = 15;
const LOLBAS_WEIGHT: u32 = 12;
const GOOD_WEIGHT: u32 = 8;
const MAX_TECHNICAL_DEPTH: u32 = 30;
const MAX_SCORE: u32 = 100;

fn cve_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)CVE-\d{4}-\d{4,}").unwrap())
}

fn hex_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b0x[0-9a-fA-F]{4,}\b").unwrap())
}

/// Matches both the full `HKEY_LOCAL_MACHINE\...` form and the short
/// `HKLM\...` abbreviation threat-intel writeups commonly use instead.
fn registry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(HKEY_(LOCAL_MACHINE|CURRENT_USER|CLASSES_ROOT|USERS)|HK(LM|CU|CR|U))\\[\w\\]+").unwrap()
    })
}

fn windows_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]:\\(?:[\w .-]+\\)*[\w .-]+").unwrap())
}

fn hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-fA-F0-9]{32,64}\b").unwrap())
}

/// Scores `content` against the configured discriminator tiers, returning the
/// additive score (capped at 100) plus the matched tokens and sub-scores for
/// `metadata.threat_hunting`.
pub fn score(content: &str, discriminators: &DiscriminatorLists) -> ThreatHuntingDetail {
    let lower = content.to_lowercase();

    let perfect_matches = matches(&lower, &discriminators.perfect);
    let lolbas_matches = matches(&lower, &discriminators.lolbas);
    let good_matches = matches(&lower, &discriminators.good);

    let technical_depth = technical_depth_score(content);

    let raw = perfect_matches.len() as u32 * PERFECT_WEIGHT
        + lolbas_matches.len() as u32 * LOLBAS_WEIGHT
        + good_matches.len() as u32 * GOOD_WEIGHT
        + technical_depth;
    let score = raw.min(MAX_SCORE);

    ThreatHuntingDetail {
        score,
        perfect_matches,
        lolbas_matches,
        good_matches,
        technical_depth,
    }
}

fn matches(lower_content: &str, dictionary: &[String]) -> Vec<String> {
    dictionary
        .iter()
        .filter(|term| lower_content.contains(&term.to_lowercase()))
        .cloned()
        .collect()
}

/// Up to 30 points for CVE refs, hex values, registry paths, Windows paths,
/// hashes, and fenced code blocks: 6 signals, `MAX_TECHNICAL_DEPTH / 6 = 5`
/// points each, present/absent (not count-weighted).
fn technical_depth_score(content: &str) -> u32 {
    let signals = [
        cve_re().is_match(content),
        hex_re().is_match(content),
        registry_re().is_match(content),
        windows_path_re().is_match(content),
        hash_re().is_match(content),
        content.contains("```"),
    ];
    let hits = signals.iter().filter(|s| **s).count() as u32;
    (hits * (MAX_TECHNICAL_DEPTH / signals.len() as u32)).min(MAX_TECHNICAL_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discriminators() -> DiscriminatorLists {
        DiscriminatorLists {
            perfect: vec!["mimikatz.exe".to_string()],
            lolbas: vec!["certutil.exe".to_string()],
            good: vec!["powershell".to_string()],
        }
    }

    #[test]
    fn additive_weights_match_spec() {
        let content = "Attacker used mimikatz.exe via certutil.exe and powershell to dump credentials.";
        let detail = score(content, &discriminators());
        assert_eq!(detail.perfect_matches.len(), 1);
        assert_eq!(detail.lolbas_matches.len(), 1);
        assert_eq!(detail.good_matches.len(), 1);
        assert_eq!(detail.score, 15 + 12 + 8);
    }

    #[test]
    fn technical_depth_adds_up_to_30() {
        let content = "See CVE-2026-12345, value 0xdeadbeef, path HKEY_LOCAL_MACHINE\\Software\\Evil, C:\\Windows\\System32\\evil.exe, hash d41d8cd98f00b204e9800998ecf8427e, and\n```\ncode\n```";
        let detail = score(content, &DiscriminatorLists::default());
        assert_eq!(detail.technical_depth, 30);
        assert_eq!(detail.score, 30);
    }

    #[test]
    fn registry_regex_matches_hklm_abbreviation() {
        assert!(registry_re().is_match(r"HKLM\Software\Microsoft\Windows\CurrentVersion\Run"));
    }

    #[test]
    fn score_caps_at_100() {
        let discriminators = DiscriminatorLists {
            perfect: vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string(), "e".to_string(), "f".to_string(), "g".to_string(), "h".to_string()],
            lolbas: vec![],
            good: vec![],
        };
        let content = "a b c d e f g h";
        let detail = score(content, &discriminators);
        assert_eq!(detail.score, 100);
    }
}
