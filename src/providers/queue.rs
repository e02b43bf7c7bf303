//! RPC request queue
//!
//! Process-wide throttle in front of every chain call: a semaphore bounds
//! in-flight requests and a start-time ledger keeps a minimum spacing between
//! request starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::utils::constants::{DEFAULT_RPC_MAX_CONCURRENT, DEFAULT_RPC_MIN_INTERVAL_MS};

#[derive(Clone)]
pub struct RpcQueue {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    /// Earliest instant the next call may start
    next_slot: Arc<Mutex<Instant>>,
}

impl Default for RpcQueue {
    fn default() -> Self {
        Self::new(
            DEFAULT_RPC_MAX_CONCURRENT,
            Duration::from_millis(DEFAULT_RPC_MIN_INTERVAL_MS),
        )
    }
}

impl RpcQueue {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_interval,
            next_slot: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Run `fut` once a concurrency permit and a start slot are available
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // closed only if the semaphore is dropped, which cannot happen while self lives
        let _permit = self.semaphore.acquire().await.ok();

        let wait = {
            let mut slot = self.next_slot.lock().await;
            let now = Instant::now();
            let start = (*slot).max(now);
            *slot = start + self.min_interval;
            start - now
        };
        if !wait.is_zero() {
            debug!("🚦 RPC queue: waiting {}ms for a start slot", wait.as_millis());
            tokio::time::sleep(wait).await;
        }

        fut.await
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_min_spacing_between_starts() {
        let queue = RpcQueue::new(8, Duration::from_millis(50));
        let t0 = Instant::now();

        let mut starts = Vec::new();
        for _ in 0..3 {
            let s = queue.run(async { Instant::now() }).await;
            starts.push(s.duration_since(t0));
        }

        assert_eq!(starts[0], Duration::ZERO);
        assert!(starts[1] >= Duration::from_millis(50));
        assert!(starts[2] >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound() {
        let queue = RpcQueue::new(2, Duration::ZERO);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let queue = queue.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run(async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.available_permits(), 2);
    }
}
