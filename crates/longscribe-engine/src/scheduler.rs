//! Bounded-concurrency dispatch of window jobs
//!
//! At most `task_concurrency_limit` windows are in flight per task, further
//! capped by the owning batch's shared ceiling. Windows complete out of
//! order; each worker owns exactly one window index for its lifetime and the
//! result map is the only concurrently-written structure, partitioned by
//! index. Cancellation stops dispatch immediately and asks in-flight workers
//! to abort cooperatively.

use crate::backend::{AudioSlice, TranscribeOptions, TranscriptionBackend};
use crate::progress::{dispatch_percent, ProgressPublisher};
use crate::retry::{run_window, RetryPolicy};
use dashmap::DashMap;
use longscribe_core::{ChunkResult, ProgressPhase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Concurrency ceilings applied to one task's dispatch
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Per-task in-flight bound
    task_permits: Arc<Semaphore>,

    /// Shared batch-level bound, when the task belongs to a batch
    batch_permits: Option<Arc<Semaphore>>,
}

impl SchedulerLimits {
    /// Create limits for a standalone task
    #[must_use]
    pub fn standalone(task_limit: usize) -> Self {
        Self {
            task_permits: Arc::new(Semaphore::new(task_limit.max(1))),
            batch_permits: None,
        }
    }

    /// Create limits for a task running inside a batch
    #[must_use]
    pub fn in_batch(task_limit: usize, batch_permits: Arc<Semaphore>) -> Self {
        Self {
            task_permits: Arc::new(Semaphore::new(task_limit.max(1))),
            batch_permits: Some(batch_permits),
        }
    }
}

/// Dispatches one task's windows against the backend
#[derive(Debug)]
pub struct ChunkScheduler {
    policy: RetryPolicy,
    per_attempt_timeout: Duration,
}

impl ChunkScheduler {
    /// Create a scheduler with the given retry policy and per-attempt timeout
    #[must_use]
    pub const fn new(policy: RetryPolicy, per_attempt_timeout: Duration) -> Self {
        Self {
            policy,
            per_attempt_timeout,
        }
    }

    /// Run every window to a terminal outcome or until cancellation
    ///
    /// Results are written into `results` keyed by window index as they
    /// arrive. `dispatch_cancel` stops new windows from being dispatched;
    /// `worker_cancel` additionally aborts in-flight attempts. Task
    /// cancellation fires both; a draining task-level timeout fires only the
    /// first. Already-completed results are always retained.
    #[allow(clippy::too_many_lines, clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        slices: Vec<AudioSlice>,
        backend: Arc<dyn TranscriptionBackend>,
        options: TranscribeOptions,
        limits: SchedulerLimits,
        dispatch_cancel: CancellationToken,
        worker_cancel: CancellationToken,
        progress: Arc<ProgressPublisher>,
        results: Arc<DashMap<usize, ChunkResult>>,
    ) {
        let total = slices.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let mut workers: JoinSet<()> = JoinSet::new();

        for slice in slices {
            if dispatch_cancel.is_cancelled() {
                debug!(window = slice.window.index, "cancellation observed, dispatch stopped");
                break;
            }

            // Task-level slot, then the shared batch slot
            let task_permit = tokio::select! {
                () = dispatch_cancel.cancelled() => break,
                permit = Arc::clone(&limits.task_permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("task semaphore closed, dispatch stopped");
                        break;
                    }
                },
            };
            let batch_permit = match &limits.batch_permits {
                Some(batch) => {
                    let acquired = tokio::select! {
                        () = dispatch_cancel.cancelled() => break,
                        permit = Arc::clone(batch).acquire_owned() => permit,
                    };
                    match acquired {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            warn!("batch semaphore closed, dispatch stopped");
                            break;
                        }
                    }
                }
                None => None,
            };

            let backend = Arc::clone(&backend);
            let options = options.clone();
            let policy = self.policy.clone();
            let per_attempt_timeout = self.per_attempt_timeout;
            let cancel = worker_cancel.clone();
            let progress = Arc::clone(&progress);
            let results = Arc::clone(&results);
            let completed = Arc::clone(&completed);

            workers.spawn(async move {
                // Permits are held for the worker's whole lifetime
                let _task_permit = task_permit;
                let _batch_permit = batch_permit;

                let done_before = completed.load(Ordering::SeqCst);
                let outcome = run_window(
                    backend.as_ref(),
                    &slice,
                    &options,
                    &policy,
                    per_attempt_timeout,
                    &cancel,
                    &progress,
                    total,
                    done_before,
                )
                .await;

                if let Some(result) = outcome {
                    let index = result.window.index;
                    let succeeded = result.outcome.is_success();
                    results.insert(index, result);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.publish(
                        ProgressPhase::Transcribing,
                        dispatch_percent(done, total),
                        format!(
                            "window {} of {} {}",
                            index + 1,
                            total,
                            if succeeded { "transcribed" } else { "failed" }
                        ),
                    );
                }
            });
        }

        // Wait for every dispatched window to reach a terminal outcome or to
        // observe cancellation
        while workers.join_next().await.is_some() {}
    }
}
