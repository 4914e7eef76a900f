//! Canonical URL normalization (§4.F, GLOSSARY "Canonical URL").
//!
//! Strips known tracking parameters for social-source URL sanitization,
//! extended with the scheme/host/port/fragment/query-ordering rules this
//! pipeline's dedup model requires.

use url::Url;

const TRACKING_PARAM_PREFIXES: &[&str] = &["utm_"];
const TRACKING_PARAM_EXACT: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "ref", "sid", "sessionid", "session_id",
    "phpsessid", "jsessionid",
];

/// Normalize a URL per §4.F: lowercase scheme+host, strip default ports, drop
/// fragment, strip tracking params, sort remaining query keys, strip a
/// trailing slash on paths longer than one character. Idempotent
/// (`normalize(normalize(u)) == normalize(u)`, invariant 4 in §8).
pub fn normalize(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw)?;

    let scheme = url.scheme().to_lowercase();
    url.set_scheme(&scheme).ok();

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    if is_default_port(&scheme, url.port()) {
        let _ = url.set_port(None);
    }

    url.set_fragment(None);

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Ok(url.to_string())
}

fn is_default_port(scheme: &str, port: Option<u16>) -> bool {
    matches!((scheme, port), ("http", Some(80)) | ("https", Some(443)))
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_lowercase();
    TRACKING_PARAM_PREFIXES.iter().any(|p| lower.starts_with(p))
        || TRACKING_PARAM_EXACT.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_utm_params_and_sorts_remaining() {
        let n = normalize("https://Example.com/Path?utm_source=x&b=2&a=1").unwrap();
        assert_eq!(n, "https://example.com/Path?a=1&b=2");
    }

    #[test]
    fn drops_fragment_and_default_port() {
        let n = normalize("https://example.com:443/path#section").unwrap();
        assert_eq!(n, "https://example.com/path");
    }

    #[test]
    fn strips_trailing_slash_but_keeps_root() {
        assert_eq!(normalize("https://example.com/a/").unwrap(), "https://example.com/a");
        assert_eq!(normalize("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("https://Example.com:443/Path/?utm_campaign=x&gclid=y&z=1#frag").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn lowercases_host_but_preserves_path_case() {
        let n = normalize("HTTPS://EXAMPLE.COM/CaseSensitivePath").unwrap();
        assert_eq!(n, "https://example.com/CaseSensitivePath");
    }
}
