//! Worker pool (§4.J): bounded concurrency over named task queues, with
//! cancellation-aware suspension points and bounded retry-with-requeue.
//!
//! Concurrency is bounded by a `Semaphore` sized to the desired
//! parallelism, acquired around each unit of work, generalized from a
//! single queue to a named-queue model.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default worker-pool size (§5 "parallel OS-level worker tasks, pool size N, default 4").
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_RETRIES: u32 = 3;
const RETRY_BACKOFF_MIN: std::time::Duration = std::time::Duration::from_secs(1);
const RETRY_BACKOFF_MAX: std::time::Duration = std::time::Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    SourceChecks,
    Workflows,
    Default,
}

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(size: usize, cancel: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `task` under the pool's concurrency bound, retrying on error up
    /// to `DEFAULT_RETRIES` times with exponential backoff, and observing
    /// the cancellation token between attempts. On cancellation, the task is
    /// abandoned without running further attempts — callers must ensure no
    /// partial state was persisted (§4.J "no partial Article is persisted").
    pub async fn run<F, Fut, T, E>(&self, queue: Queue, label: &str, mut task: F) -> Option<Result<T, E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
            _ = self.cancel.cancelled() => {
                info!(queue = ?queue, label, "cancelled before acquiring worker permit");
                return None;
            }
        };
        let _permit = permit;

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                info!(queue = ?queue, label, attempt, "cancelled, requeueing with retries_left decremented");
                return None;
            }

            match task().await {
                Ok(value) => return Some(Ok(value)),
                Err(e) if attempt + 1 < DEFAULT_RETRIES => {
                    warn!(queue = ?queue, label, attempt = attempt + 1, error = %e, "task failed, retrying");
                    let backoff = backoff_for(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => {
                            info!(queue = ?queue, label, "cancelled during retry backoff");
                            return None;
                        }
                    }
                    attempt += 1;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn backoff_for(attempt: u32) -> std::time::Duration {
    let doubled = RETRY_BACKOFF_MIN.as_secs_f64() * 2f64.powi(attempt as i32);
    std::time::Duration::from_secs_f64(doubled).min(RETRY_BACKOFF_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_up_to_default_then_succeeds() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let attempts = AtomicU32::new(0);
        let result: Option<Result<(), String>> = pool
            .run(Queue::Default, "test-task", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_running() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(2, cancel);
        let result: Option<Result<(), String>> = pool
            .run(Queue::Default, "test-task", || async { Ok(()) })
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn backoff_stays_within_1s_to_8s_band() {
        assert_eq!(backoff_for(0), std::time::Duration::from_secs(1));
        assert_eq!(backoff_for(3), std::time::Duration::from_secs(8));
        assert_eq!(backoff_for(10), std::time::Duration::from_secs(8));
    }
}
