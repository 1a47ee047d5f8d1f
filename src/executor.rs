//! Bounded worker pools for blocking or CPU-bound work.
//!
//! Request handlers run on cooperative coroutines, so anything that blocks a
//! thread must be offloaded. Each entry in the `threads` settings mapping
//! becomes one [`ExecutorPool`]: a set of worker coroutines sharing a job
//! queue. [`ExecutorPool::execute`] submits a closure and parks the calling
//! coroutine until the result comes back over a reply channel.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use may::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::ApiError;

type Job = Box<dyn FnOnce() + Send>;

/// Counters exposed by a pool for monitoring.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    queue_depth: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl PoolMetrics {
    fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// A named pool of worker coroutines consuming a shared job queue.
pub struct ExecutorPool {
    name: String,
    sender: mpsc::Sender<Job>,
    metrics: Arc<PoolMetrics>,
}

impl ExecutorPool {
    /// Spawn `workers` worker coroutines with the given stack size.
    #[must_use]
    pub fn new(name: impl Into<String>, workers: usize, stack_size: usize) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(PoolMetrics::default());

        info!(
            pool = %name,
            workers = workers,
            stack_size = stack_size,
            "Starting executor pool"
        );

        for worker_id in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);
            let pool_name = name.clone();
            // SAFETY: spawning is unsafe in the may runtime; the worker body
            // owns all captured state and exits when the job channel closes.
            let spawned = unsafe {
                may::coroutine::Builder::new()
                    .stack_size(stack_size)
                    .spawn(move || {
                        debug!(pool = %pool_name, worker_id = worker_id, "Worker started");
                        while let Ok(job) = rx.recv() {
                            job();
                            metrics.record_complete();
                        }
                        debug!(pool = %pool_name, worker_id = worker_id, "Worker exiting");
                    })
            };
            if let Err(err) = spawned {
                error!(pool = %name, worker_id = worker_id, error = %err, "Failed to spawn worker");
            }
        }

        Self {
            name,
            sender: tx,
            metrics,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Run a closure on the pool and wait for its result.
    ///
    /// The calling coroutine suspends until the job completes. Returns a 503
    /// if the pool's workers are gone.
    pub fn execute<F, R>(&self, job: F) -> Result<R, ApiError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel::<R>();
        self.metrics.record_submit();
        let wrapped: Job = Box::new(move || {
            let _ = reply_tx.send(job());
        });
        if self.sender.send(wrapped).is_err() {
            error!(pool = %self.name, "Executor pool channel disconnected");
            return Err(ApiError::new(503).with_message("worker pool is not available"));
        }
        reply_rx
            .recv()
            .map_err(|_| ApiError::new(500).with_message("worker pool dropped the job"))
    }
}
