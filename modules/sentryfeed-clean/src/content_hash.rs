//! Exact-duplicate fingerprinting via SHA-256 (§4.B `content_hash`).
//!
//! The dedup invariant (§8 #1: `content_hash` equality implies same article)
//! needs a cryptographic hash rather than a fast non-cryptographic one, so
//! this uses `sha2`.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest over `lower(strip_ws(title)) + "\n" + strip_ws(content)`.
pub fn content_hash(title: &str, content: &str) -> String {
    let normalized_title = strip_ws(title).to_lowercase();
    let normalized_content = strip_ws(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized_title.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized_content.as_bytes());
    hex::encode(hasher.finalize())
}

fn strip_ws(s: &str) -> String {
    s.trim().split_whitespace().collect::<Vec<_>>().join(" ")
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_under_title_case_and_surrounding_whitespace() {
        let a = content_hash("  My Title  ", "some content body here");
        let b = content_hash("MY TITLE", "some content body here");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_produces_different_hash() {
        let a = content_hash("Title", "content A");
        let b = content_hash("Title", "content B");
        assert_ne!(a, b);
    }

    #[test]
    fn produces_64_hex_chars() {
        let h = content_hash("T", "C");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
