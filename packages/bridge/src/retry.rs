//! In-process retry scheduling with exponential backoff.
//!
//! Retries live in this process only: they do not survive a restart.
//! Outstanding timers are cancelled at shutdown.

use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Backoff policy: `base * factor^(attempt-1)`, capped, with ±25% jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Deterministic backoff before jitter, for the given 1-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self.base.as_millis() as f64 * self.factor.powi(exponent as i32);
        let capped = scaled.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Scheduler for retry tasks.
pub struct RetryService {
    policy: RetryPolicy,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RetryService {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Backoff with jitter for the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.policy.backoff(attempt);
        let jitter: f64 = rand::rng().random_range(0.75..=1.25);
        Duration::from_millis((backoff.as_millis() as f64 * jitter) as u64)
    }

    /// Schedule `task` to run after the backoff for `attempt`.
    pub fn schedule<F>(&self, attempt: u32, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay_for(attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Number of timers not yet fired or finished.
    pub fn pending(&self) -> usize {
        self.tasks.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Cancel every outstanding timer.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RetryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
