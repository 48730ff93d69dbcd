//! Bounded worker pool for fire-and-forget storage tasks.
//!
//! Submissions go through a bounded queue; a dispatcher task drains it and
//! runs each job under a concurrency-capping semaphore. A full queue drops
//! the task and bumps a counter instead of ever blocking the request path.
//! The drop policy is the saturation behaviour; there is no blocking
//! variant.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::metrics::BridgeMetrics;

type StoreJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded executor for storage tasks.
pub struct StorageWorkerPool {
    sender: Mutex<Option<mpsc::Sender<StoreJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    metrics: Arc<BridgeMetrics>,
}

impl StorageWorkerPool {
    /// Pool with `max_concurrency` simultaneous jobs and a queue of
    /// `queue_capacity` waiting jobs.
    pub fn new(max_concurrency: usize, queue_capacity: usize, metrics: Arc<BridgeMetrics>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreJob>(queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let dispatcher_semaphore = semaphore.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                // Hold a permit before taking a job so a busy pool leaves
                // queued work in the bounded channel, where saturation is
                // visible to submitters.
                let Ok(permit) = dispatcher_semaphore.clone().acquire_owned().await else {
                    break;
                };
                match rx.recv().await {
                    Some(job) => {
                        tokio::spawn(async move {
                            job.await;
                            drop(permit);
                        });
                    }
                    None => {
                        drop(permit);
                        break;
                    }
                }
            }
        });

        Self {
            sender: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            semaphore,
            max_concurrency: max_concurrency.max(1),
            metrics,
        }
    }

    /// Enqueue a storage task. Returns false when the queue is saturated
    /// or the pool is shut down; the task is dropped and counted.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            self.metrics.record_store_dropped();
            tracing::warn!("Store task dropped: worker pool is shut down");
            return false;
        };

        match sender.try_send(Box::pin(job)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_store_dropped();
                tracing::warn!("Store task dropped: worker queue saturated");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_store_dropped();
                tracing::warn!("Store task dropped: worker pool is shut down");
                false
            }
        }
    }

    /// Stop accepting work, drain the queue, and wait for in-flight jobs.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }
        // All permits back means all spawned jobs finished
        let _ = self
            .semaphore
            .acquire_many(self.max_concurrency as u32)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_to_completion() {
        let metrics = Arc::new(BridgeMetrics::new());
        let pool = StorageWorkerPool::new(4, 16, metrics.clone());
        let done = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let done = done.clone();
            assert!(pool.submit(async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(metrics.snapshot().store_tasks_dropped, 0);
    }

    #[tokio::test]
    async fn test_saturation_drops_and_counts() {
        let metrics = Arc::new(BridgeMetrics::new());
        // One worker, queue of one: the third submission must drop
        let pool = StorageWorkerPool::new(1, 1, metrics.clone());

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        pool.submit(async move {
            let _ = release_rx.await;
        });
        // Give the dispatcher time to move the blocker into a worker slot
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.submit(async {});
        let accepted = pool.submit(async {});

        assert!(!accepted);
        assert_eq!(metrics.snapshot().store_tasks_dropped, 1);

        let _ = release_tx.send(());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_drops() {
        let metrics = Arc::new(BridgeMetrics::new());
        let pool = StorageWorkerPool::new(2, 8, metrics.clone());
        pool.shutdown().await;

        assert!(!pool.submit(async {}));
        assert_eq!(metrics.snapshot().store_tasks_dropped, 1);
    }
}
