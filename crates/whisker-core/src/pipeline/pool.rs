//! CPU worker pool for the process stage.
//!
//! Jobs run on dedicated OS threads so numeric work never blocks the async
//! runtime. Each job reports back through its own oneshot channel; a panic
//! inside a job is caught and turned into a per-item error.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{PipelineError, PipelineResult};

/// A bounded pool acquired for one process stage.
///
/// Dropping the pool tells its threads to exit, but only after every job
/// already submitted has run. Work is not cancelled.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("whisker-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` once per input and return the outcomes in input order.
    ///
    /// All jobs are submitted before any result is awaited, so they execute
    /// in parallel up to the pool size.
    pub async fn run_all<I, O, F>(
        &self,
        inputs: Vec<(usize, I)>,
        job: F,
    ) -> Vec<(usize, PipelineResult<O>)>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> PipelineResult<O> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let pending: Vec<_> = inputs
            .into_iter()
            .map(|(index, input)| {
                let (tx, rx) = oneshot::channel();
                let job = Arc::clone(&job);
                self.pool.spawn(move || {
                    let worker = std::thread::current()
                        .name()
                        .unwrap_or("worker")
                        .to_string();
                    tracing::debug!(index, %worker, "Worker picked up item");
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(input)))
                        .unwrap_or_else(|payload| {
                            Err(PipelineError::WorkerPanic {
                                index,
                                message: panic_message(payload.as_ref()),
                            })
                        });
                    tracing::debug!(index, %worker, ok = outcome.is_ok(), "Worker finished item");
                    // The receiver is gone only if the batch was abandoned.
                    let _ = tx.send(outcome);
                });
                (index, rx)
            })
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for (index, rx) in pending {
            let outcome = rx.await.unwrap_or_else(|_| {
                Err(PipelineError::WorkerPanic {
                    index,
                    message: "worker exited without a result".to_string(),
                })
            });
            results.push((index, outcome));
        }
        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
