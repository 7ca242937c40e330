//! Engine facade: task and batch submission, snapshots, cancellation, stats
//!
//! The engine owns the stores and spawns one runner future per task. All
//! public operations are cheap and non-blocking; the work happens on the
//! spawned futures.

use crate::backend::{AudioExtractor, TranscriptionBackend};
use crate::batch::{BatchRecord, BatchStore};
use crate::task::{TaskRecord, TaskRunner, TaskStore};
use chrono::{DateTime, Utc};
use longscribe_core::{
    BatchSnapshot, EngineConfig, EngineStats, Error, ProgressEvent, Result, SourceDescriptor,
    TaskOptions, TaskSnapshot, TaskState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

/// Aggregated counters, updated as tasks reach terminal states
#[derive(Debug, Default)]
struct StatsCollector {
    stats: Mutex<EngineStats>,
}

impl StatsCollector {
    fn record_submitted(&self, count: u64) {
        self.stats.lock().tasks_submitted += count;
    }

    fn record_terminal(&self, terminal: TaskState, audio_seconds: f64) {
        let mut stats = self.stats.lock();
        match terminal {
            TaskState::Completed => {
                stats.tasks_completed += 1;
                stats.audio_seconds_processed += audio_seconds;
            }
            TaskState::PartiallyCompleted => {
                stats.tasks_partially_completed += 1;
                stats.audio_seconds_processed += audio_seconds;
            }
            TaskState::Cancelled => stats.tasks_cancelled += 1,
            _ => stats.tasks_failed += 1,
        }
    }

    fn snapshot(&self) -> EngineStats {
        self.stats.lock().clone()
    }
}

/// Chunked transcription orchestration engine
///
/// Cheap to share behind an [`Arc`]; every operation takes `&self`.
pub struct TranscriptionEngine {
    config: EngineConfig,
    runner: Arc<TaskRunner>,
    tasks: Arc<TaskStore>,
    batches: BatchStore,
    stats: Arc<StatsCollector>,
}

impl std::fmt::Debug for TranscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionEngine")
            .field("tasks", &self.tasks.len())
            .field("batches", &self.batches.len())
            .finish_non_exhaustive()
    }
}

impl TranscriptionEngine {
    /// Create an engine around the external collaborators
    ///
    /// Fails fast on invalid configuration.
    pub fn new(
        backend: Arc<dyn TranscriptionBackend>,
        extractor: Arc<dyn AudioExtractor>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(backend = backend.name(), "transcription engine created");
        Ok(Self {
            runner: Arc::new(TaskRunner::new(backend, extractor, config.clone())),
            config,
            tasks: Arc::new(TaskStore::new()),
            batches: BatchStore::new(),
            stats: Arc::new(StatsCollector::default()),
        })
    }

    /// Submit a single transcription task
    ///
    /// Returns immediately with the task id; the task runs on a spawned
    /// future and is observable through snapshots and progress events.
    pub fn submit_task(&self, source: SourceDescriptor, options: TaskOptions) -> Uuid {
        let record = TaskRecord::new(source, options);
        let id = record.id;
        info!(task_id = %id, source = %record.source, "task submitted");
        self.tasks.insert(Arc::clone(&record));
        self.stats.record_submitted(1);
        self.spawn_runner(record, None);
        id
    }

    /// Submit a batch of sources sharing one concurrency ceiling and options
    ///
    /// Returns the batch id; member task ids are available from the batch
    /// snapshot in submission order.
    pub fn submit_batch(
        &self,
        sources: Vec<SourceDescriptor>,
        options: TaskOptions,
    ) -> Result<Uuid> {
        if sources.is_empty() {
            return Err(Error::validation("sources", "batch must not be empty"));
        }

        let records: Vec<Arc<TaskRecord>> = sources
            .into_iter()
            .map(|source| TaskRecord::new(source, options.clone()))
            .collect();
        let batch = BatchRecord::new(
            records.iter().map(|record| record.id).collect(),
            self.config.concurrency.batch_concurrency_limit,
        );
        let batch_id = batch.id;
        info!(batch_id = %batch_id, members = records.len(), "batch submitted");

        self.stats.record_submitted(records.len() as u64);
        self.batches.insert(Arc::clone(&batch));
        for record in records {
            self.tasks.insert(Arc::clone(&record));
            self.spawn_runner(record, Some(batch.permits()));
        }
        Ok(batch_id)
    }

    /// Snapshot a task
    pub fn task_snapshot(&self, id: Uuid) -> Result<TaskSnapshot> {
        self.tasks.snapshot(id)
    }

    /// Snapshot a batch
    pub fn batch_snapshot(&self, id: Uuid) -> Result<BatchSnapshot> {
        self.batches.snapshot(id, &self.tasks)
    }

    /// Request cancellation of a task
    ///
    /// Returns once the request is recorded; the task reaches `Cancelled`
    /// asynchronously. Cancelling a terminal task is a no-op.
    pub fn cancel_task(&self, id: Uuid) -> Result<()> {
        self.tasks.cancel(id)
    }

    /// Request cancellation of a batch and all its member tasks
    pub fn cancel_batch(&self, id: Uuid) -> Result<()> {
        self.batches.cancel(id, &self.tasks)
    }

    /// Subscribe to a task's progress events
    pub fn subscribe_progress(&self, id: Uuid) -> Result<async_channel::Receiver<ProgressEvent>> {
        self.tasks.subscribe(id)
    }

    /// Aggregate engine statistics
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Number of non-terminal tasks
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tasks.active_count()
    }

    /// Drop terminal tasks that finished before `cutoff`
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.tasks.evict_finished_before(cutoff)
    }

    fn spawn_runner(&self, record: Arc<TaskRecord>, batch_permits: Option<Arc<Semaphore>>) {
        let runner = Arc::clone(&self.runner);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let terminal = runner.run(Arc::clone(&record), batch_permits).await;
            stats.record_terminal(terminal, record.duration_seconds());
        });
    }
}
