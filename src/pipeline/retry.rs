//! Delayed requeue with exponential backoff and jitter.
//!
//! A worker that pushes a failed item straight back onto its own input
//! queue busy-loops for as long as the engine stays down. Retries are
//! instead handed to a spawned timer task that sleeps the computed delay
//! and then performs the (blocking, backpressured) enqueue, leaving the
//! consumer loop free.

use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Exponential backoff policy with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self { base, max, jitter }
    }

    /// Delay before the given retry attempt: `base * 2^attempt`, capped at
    /// `max`, scaled by a random factor in `[1 - jitter, 1 + jitter]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let capped = base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max.as_millis() as u64);

        if self.jitter <= 0.0 {
            return Duration::from_millis(capped);
        }

        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_millis((capped as f64 * factor) as u64)
    }

    /// Requeue `item` onto `tx` after the backoff delay for its attempt
    /// count. The send blocks the timer task, not the worker, when the
    /// queue is full.
    pub fn requeue_later<T: Send + 'static>(&self, tx: mpsc::Sender<T>, item: T, attempt: u32) {
        let delay = self.delay(attempt);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(item).await.is_err() {
                warn!("Dropping retry: queue closed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(10), 0.2);

        for (attempt, expected_ms) in [(0u32, 100u64), (1, 200), (2, 400), (5, 3_200)] {
            let delay = policy.delay(attempt).as_millis() as u64;
            let lo = expected_ms * 8 / 10;
            let hi = expected_ms * 12 / 10;
            assert!(
                (lo..=hi).contains(&delay),
                "attempt {}: {}ms outside [{}, {}]",
                attempt,
                delay,
                lo,
                hi
            );
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 0.0);
        assert_eq!(policy.delay(10), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(60), 0.0);
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(3), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn requeue_later_delivers_after_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 0.0);
        let (tx, mut rx) = mpsc::channel::<&'static str>(1);

        policy.requeue_later(tx, "item", 2);

        // nothing lands before the 400ms backoff elapses
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some("item"));
    }
}
