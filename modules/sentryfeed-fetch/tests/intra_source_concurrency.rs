//! Checks that the `buffered(N)` pattern `Fetcher::discover_and_process`
//! uses for candidate URLs both bounds concurrency (§4.J "bounded
//! intra-source concurrency (default 4)") and preserves discovery order
//! (§5 "URLs processed in discovery order"), independent of the full
//! `Fetcher`/`Store`/`HttpClient` wiring (which needs a live database).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sentryfeed_fetch::DEFAULT_INTRA_SOURCE_CONCURRENCY;

#[tokio::test]
async fn buffered_bounds_concurrency_and_preserves_order() {
    const ITEMS: usize = 20;

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));

    let results: Vec<usize> = stream::iter((0..ITEMS).map(|i| {
        let in_flight = Arc::clone(&in_flight);
        let max_observed = Arc::clone(&max_observed);
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(now, Ordering::SeqCst);
            // Earlier-discovered items sleep longer, so a naive unordered
            // buffer would finish them out of order; `buffered` must not.
            tokio::time::sleep(std::time::Duration::from_millis((ITEMS - i) as u64)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            i
        }
    }))
    .buffered(DEFAULT_INTRA_SOURCE_CONCURRENCY)
    .collect()
    .await;

    assert_eq!(results, (0..ITEMS).collect::<Vec<_>>(), "buffered must preserve discovery order");
    assert!(
        max_observed.load(Ordering::SeqCst) <= DEFAULT_INTRA_SOURCE_CONCURRENCY,
        "observed {} concurrent candidate fetches against a bound of {}",
        max_observed.load(Ordering::SeqCst),
        DEFAULT_INTRA_SOURCE_CONCURRENCY
    );
}
