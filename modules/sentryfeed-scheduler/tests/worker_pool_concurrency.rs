//! Integration-level check that `WorkerPool` actually bounds concurrency
//! across independently-submitted tasks, rather than only serializing
//! retries within a single task (already covered by the in-crate unit
//! tests in `worker_pool.rs`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sentryfeed_scheduler::worker_pool::{Queue, WorkerPool};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn concurrent_in_flight_tasks_never_exceed_pool_size() {
    const POOL_SIZE: usize = 3;
    const TASK_COUNT: usize = 12;

    let pool = Arc::new(WorkerPool::new(POOL_SIZE, CancellationToken::new()));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..TASK_COUNT)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);
            let max_observed = Arc::clone(&max_observed);
            tokio::spawn(async move {
                let result: Option<Result<(), String>> = pool
                    .run(Queue::Default, &format!("task-{i}"), || {
                        let in_flight = Arc::clone(&in_flight);
                        let max_observed = Arc::clone(&max_observed);
                        async move {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max_observed.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok::<(), String>(())
                        }
                    })
                    .await;
                assert!(matches!(result, Some(Ok(()))));
            })
        })
        .collect();

    for h in handles {
        h.await.unwrap();
    }

    assert!(
        max_observed.load(Ordering::SeqCst) <= POOL_SIZE,
        "observed {} concurrent tasks against a pool of size {}",
        max_observed.load(Ordering::SeqCst),
        POOL_SIZE
    );
}
