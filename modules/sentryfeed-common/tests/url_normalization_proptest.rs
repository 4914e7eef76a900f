//! Property tests for `url_norm::normalize` against spec §8 invariant 4:
//! `normalize(normalize(u)) == normalize(u)`.

use proptest::prelude::*;
use sentryfeed_common::url_norm::normalize;

fn arb_host() -> impl Strategy<Value = String> {
    "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}".prop_map(|s| s)
}

fn arb_path_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{0,12}".prop_map(|s| s)
}

fn arb_query_pair() -> impl Strategy<Value = (String, String)> {
    ("[a-z_]{1,10}", "[a-zA-Z0-9]{0,10}").prop_map(|(k, v)| (k.to_string(), v.to_string()))
}

fn arb_url() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        arb_host(),
        prop::collection::vec(arb_path_segment(), 0..4),
        prop::collection::vec(arb_query_pair(), 0..4),
        prop::option::of("[a-zA-Z0-9_-]{0,8}"),
    )
        .prop_map(|(https, host, segments, query, fragment)| {
            let scheme = if https { "https" } else { "http" };
            let mut url = format!("{scheme}://{host}");
            for seg in &segments {
                url.push('/');
                url.push_str(seg);
            }
            if !query.is_empty() {
                let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
                url.push('?');
                url.push_str(&pairs.join("&"));
            }
            if let Some(frag) = fragment {
                url.push('#');
                url.push_str(&frag);
            }
            url
        })
}

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in arb_url()) {
        if let Ok(once) = normalize(&raw) {
            let twice = normalize(&once).expect("a normalized URL must re-parse");
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn normalize_never_leaves_a_fragment(raw in arb_url()) {
        if let Ok(normalized) = normalize(&raw) {
            prop_assert!(!normalized.contains('#'));
        }
    }

    #[test]
    fn normalize_lowercases_the_host(raw in arb_url()) {
        if let Ok(normalized) = normalize(&raw) {
            let host_part = normalized
                .splitn(2, "://")
                .nth(1)
                .unwrap_or("")
                .split(['/', '?'])
                .next()
                .unwrap_or("");
            prop_assert_eq!(host_part.to_lowercase(), host_part.to_string());
        }
    }
}
