//! Per-host politeness ledger (SPEC_FULL §0 supplemented feature 3): a
//! ring buffer of the last N requests per host, kept purely for `stats`
//! diagnostics, scoped to a single running client instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const MAX_ENTRIES_PER_HOST: usize = 50;

#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub url: String,
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub at: Instant,
}

/// Shared ring buffer of recent requests, keyed by host.
#[derive(Clone, Default)]
pub struct RequestLedger {
    hosts: Arc<Mutex<HashMap<String, VecDeque<RequestLogEntry>>>>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, host: &str, url: &str, status: Option<u16>, elapsed: Duration) {
        let mut guard = self.hosts.lock().await;
        let ring = guard.entry(host.to_string()).or_default();
        if ring.len() >= MAX_ENTRIES_PER_HOST {
            ring.pop_front();
        }
        ring.push_back(RequestLogEntry {
            url: url.to_string(),
            status,
            elapsed,
            at: Instant::now(),
        });
    }

    pub async fn recent(&self, host: &str) -> Vec<RequestLogEntry> {
        let guard = self.hosts.lock().await;
        guard.get(host).map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }

    pub async fn host_count(&self) -> usize {
        self.hosts.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_buffer_caps_at_max_entries() {
        let ledger = RequestLedger::new();
        for i in 0..(MAX_ENTRIES_PER_HOST + 10) {
            ledger
                .record("example.com", &format!("https://example.com/{i}"), Some(200), Duration::from_millis(1))
                .await;
        }
        assert_eq!(ledger.recent("example.com").await.len(), MAX_ENTRIES_PER_HOST);
    }

    #[tokio::test]
    async fn unseen_host_returns_empty() {
        let ledger = RequestLedger::new();
        assert!(ledger.recent("never-seen.example").await.is_empty());
    }
}
