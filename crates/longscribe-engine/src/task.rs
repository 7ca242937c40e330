//! Task records, the task store and the per-task runner
//!
//! A task moves `Pending -> Planning -> Dispatching -> Merging -> terminal`.
//! Terminal states are never overwritten: cancellation after completion is a
//! no-op, and a cancelled task never later reports success. The runner owns
//! the task future end to end; artifact cleanup is tied to the artifact scope
//! so it holds on success, failure, cancellation and timeout alike.

use crate::artifacts::ArtifactScope;
use crate::backend::{AudioExtractor, AudioSlice, TranscribeOptions, TranscriptionBackend};
use crate::planner;
use crate::progress::{ProgressPublisher, PERCENT_DISPATCHED, PERCENT_EXTRACTED, PERCENT_PLANNED};
use crate::retry::RetryPolicy;
use crate::scheduler::{ChunkScheduler, SchedulerLimits};
use crate::stitcher;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use longscribe_core::{
    AudioWindow, ChunkResult, EngineConfig, Error, MergedTranscript, ProgressEvent, ProgressPhase,
    Result, SourceDescriptor, TaskOptions, TaskSnapshot, TaskState, TimeoutPolicy,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared mutable state of one transcription task
#[derive(Debug)]
pub struct TaskRecord {
    /// Task id
    pub id: Uuid,

    /// Source being transcribed
    pub source: SourceDescriptor,

    /// Per-task options supplied at submission
    pub options: TaskOptions,

    state: RwLock<TaskState>,
    windows: RwLock<Vec<AudioWindow>>,
    results: Arc<DashMap<usize, ChunkResult>>,
    transcript: RwLock<Option<MergedTranscript>>,
    error: RwLock<Option<String>>,
    duration_seconds: RwLock<f64>,
    created_at: DateTime<Utc>,
    completed_at: RwLock<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
    progress: Arc<ProgressPublisher>,
    events: async_channel::Receiver<ProgressEvent>,
}

impl TaskRecord {
    /// Create a new record in `Pending` state
    #[must_use]
    pub fn new(source: SourceDescriptor, options: TaskOptions) -> Arc<Self> {
        let id = Uuid::new_v4();
        let (progress, events) = ProgressPublisher::channel(id);
        Arc::new(Self {
            id,
            source,
            options,
            state: RwLock::new(TaskState::Pending),
            windows: RwLock::new(Vec::new()),
            results: Arc::new(DashMap::new()),
            transcript: RwLock::new(None),
            error: RwLock::new(None),
            duration_seconds: RwLock::new(0.0),
            created_at: Utc::now(),
            completed_at: RwLock::new(None),
            cancel: CancellationToken::new(),
            progress,
            events,
        })
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    /// Source duration reported by the extractor, 0 before planning
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        *self.duration_seconds.read()
    }

    /// Request cancellation
    ///
    /// Idempotent; has no effect once the task is terminal.
    pub fn request_cancel(&self) {
        if !self.state().is_terminal() {
            info!(task_id = %self.id, "cancellation requested");
            self.cancel.cancel();
        }
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Subscribe to this task's progress events
    #[must_use]
    pub fn subscribe(&self) -> async_channel::Receiver<ProgressEvent> {
        self.events.clone()
    }

    /// Point-in-time snapshot
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            source: self.source.clone(),
            state: self.state(),
            percent: self.progress.last_percent(),
            transcript: self.transcript.read().clone(),
            error: self.error.read().clone(),
            total_windows: self.windows.read().len(),
            completed_windows: self.results.len(),
            created_at: self.created_at,
            completed_at: *self.completed_at.read(),
        }
    }

    /// Advance to a non-terminal state; ignored once terminal
    fn advance(&self, next: TaskState) {
        let mut state = self.state.write();
        if !state.is_terminal() {
            debug!(task_id = %self.id, from = %*state, to = %next, "task state transition");
            *state = next;
        }
    }

    /// Record the terminal outcome; first terminal transition wins
    pub(crate) fn finish(
        &self,
        terminal: TaskState,
        transcript: Option<MergedTranscript>,
        error: Option<String>,
    ) {
        let mut state = self.state.write();
        if state.is_terminal() {
            return;
        }
        info!(task_id = %self.id, from = %*state, to = %terminal, "task reached terminal state");
        *state = terminal;
        *self.transcript.write() = transcript;
        *self.error.write() = error;
        *self.completed_at.write() = Some(Utc::now());
    }
}

/// In-memory registry of task records
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<Uuid, Arc<TaskRecord>>,
}

impl TaskStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record
    pub fn insert(&self, record: Arc<TaskRecord>) {
        self.tasks.insert(record.id, record);
    }

    /// Look up a record
    pub fn get(&self, id: Uuid) -> Result<Arc<TaskRecord>> {
        self.tasks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::TaskNotFound { id })
    }

    /// Snapshot a task
    pub fn snapshot(&self, id: Uuid) -> Result<TaskSnapshot> {
        Ok(self.get(id)?.snapshot())
    }

    /// Request cancellation of a task
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        self.get(id)?.request_cancel();
        Ok(())
    }

    /// Subscribe to a task's progress events
    pub fn subscribe(&self, id: Uuid) -> Result<async_channel::Receiver<ProgressEvent>> {
        Ok(self.get(id)?.subscribe())
    }

    /// Number of registered tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of non-terminal tasks
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.value().state().is_terminal())
            .count()
    }

    /// Records currently in the given state
    #[must_use]
    pub fn tasks_by_state(&self, state: TaskState) -> Vec<Arc<TaskRecord>> {
        self.tasks
            .iter()
            .filter(|entry| entry.value().state() == state)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Task count per state
    #[must_use]
    pub fn status_summary(&self) -> HashMap<TaskState, usize> {
        let mut summary = HashMap::new();
        for entry in self.tasks.iter() {
            *summary.entry(entry.value().state()).or_insert(0) += 1;
        }
        summary
    }

    /// Remove terminal tasks that finished before `cutoff`
    ///
    /// Returns the number of evicted records. Non-terminal tasks are never
    /// evicted.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, record| {
            !record.state().is_terminal()
                || record
                    .completed_at
                    .read()
                    .map_or(true, |finished| finished >= cutoff)
        });
        before - self.tasks.len()
    }
}

/// Drives one task from `Pending` to a terminal state
pub struct TaskRunner {
    backend: Arc<dyn TranscriptionBackend>,
    extractor: Arc<dyn AudioExtractor>,
    config: EngineConfig,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Create a runner around the external collaborators
    #[must_use]
    pub fn new(
        backend: Arc<dyn TranscriptionBackend>,
        extractor: Arc<dyn AudioExtractor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            extractor,
            config,
        }
    }

    /// Run a task to its terminal state and return it
    ///
    /// `batch_permits` is the shared batch ceiling when the task belongs to a
    /// batch. Never returns a non-terminal state.
    #[tracing::instrument(skip_all, fields(task_id = %record.id, source = %record.source))]
    pub async fn run(
        &self,
        record: Arc<TaskRecord>,
        batch_permits: Option<Arc<Semaphore>>,
    ) -> TaskState {
        if record.cancel_requested() {
            return self.finish(&record, TaskState::Cancelled, None, None).await;
        }

        record.progress.publish(ProgressPhase::Queued, 0, "task accepted");

        // Planning: probe the source and compute the window sequence
        record.advance(TaskState::Planning);
        record
            .progress
            .publish(ProgressPhase::Planning, 0, format!("planning {}", record.source));

        let audio = match self.extractor.extract(&record.source).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(task_id = %record.id, error = %e, "extraction failed");
                return self
                    .finish(&record, TaskState::Failed, None, Some(e.to_string()))
                    .await;
            }
        };
        *record.duration_seconds.write() = audio.duration_seconds;

        let windows = match planner::plan(audio.duration_seconds, &self.config.chunking) {
            Ok(windows) => windows,
            Err(e) => {
                warn!(task_id = %record.id, error = %e, "window planning failed");
                return self
                    .finish(&record, TaskState::Failed, None, Some(e.to_string()))
                    .await;
            }
        };
        record.windows.write().clone_from(&windows);
        record.progress.publish(
            ProgressPhase::Planning,
            PERCENT_PLANNED,
            format!("planned {} windows", windows.len()),
        );

        // Extraction: materialize one slice per window into the task scope
        let scope = match &self.config.artifact_dir {
            Some(base) => ArtifactScope::in_dir(record.id, base),
            None => ArtifactScope::for_task(record.id),
        };
        let mut scope = match scope {
            Ok(scope) => scope,
            Err(e) => {
                return self
                    .finish(&record, TaskState::Failed, None, Some(e.to_string()))
                    .await;
            }
        };
        let slices = match self.materialize_slices(&audio, &windows, &scope).await {
            Ok(slices) => slices,
            Err(e) => {
                scope.release();
                return self
                    .finish(&record, TaskState::Failed, None, Some(e.to_string()))
                    .await;
            }
        };
        record.progress.publish(
            ProgressPhase::Extracting,
            PERCENT_EXTRACTED,
            format!("materialized {} slices", slices.len()),
        );

        // Dispatching under the task timeout, if one is configured
        record.advance(TaskState::Dispatching);
        let timed_out = self.dispatch(&record, slices, batch_permits).await;
        scope.release();

        if record.cancel_requested() || timed_out {
            let error = timed_out.then(|| {
                format!(
                    "task timed out after {}s",
                    self.task_timeout(&record).map_or(0, |t| t.as_secs())
                )
            });
            // Collected window results stay queryable: merge what completed,
            // with gap markers for windows that never finished
            let transcript = stitcher::merge(&windows, Self::collected_results(&record));
            return self
                .finish(&record, TaskState::Cancelled, Some(transcript), error)
                .await;
        }

        // Merging: every window has a terminal result
        record.advance(TaskState::Merging);
        record.progress.publish(
            ProgressPhase::Merging,
            PERCENT_DISPATCHED,
            "merging window transcripts",
        );

        let results = Self::collected_results(&record);
        let successes = results
            .values()
            .filter(|result| result.outcome.is_success())
            .count();
        let merged = stitcher::merge(&windows, results);

        if successes == 0 {
            let error = format!("all {} windows failed", windows.len());
            return self.finish(&record, TaskState::Failed, None, Some(error)).await;
        }
        let terminal = if merged.partial {
            TaskState::PartiallyCompleted
        } else {
            TaskState::Completed
        };
        self.finish(&record, terminal, Some(merged), None).await
    }

    /// Clone the terminal window results collected so far
    fn collected_results(record: &TaskRecord) -> HashMap<usize, ChunkResult> {
        record
            .results
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Slice every window into the scope's directory, registering each path
    async fn materialize_slices(
        &self,
        audio: &crate::backend::ExtractedAudio,
        windows: &[AudioWindow],
        scope: &ArtifactScope,
    ) -> Result<Vec<AudioSlice>> {
        let Some(dir) = scope.dir() else {
            return Err(Error::scheduler("artifact scope already released"));
        };
        let mut slices = Vec::with_capacity(windows.len());
        for window in windows {
            let slice = self.extractor.slice(audio, *window, dir).await?;
            scope.register(slice.path.clone());
            slices.push(slice);
        }
        Ok(slices)
    }

    /// Run the scheduler under the task timeout; returns whether it fired
    async fn dispatch(
        &self,
        record: &TaskRecord,
        slices: Vec<AudioSlice>,
        batch_permits: Option<Arc<Semaphore>>,
    ) -> bool {
        let task_limit = record
            .options
            .concurrency_limit
            .unwrap_or(self.config.concurrency.task_concurrency_limit);
        let limits = match batch_permits {
            Some(batch) => SchedulerLimits::in_batch(task_limit, batch),
            None => SchedulerLimits::standalone(task_limit),
        };
        let options = TranscribeOptions {
            language: record
                .options
                .language
                .clone()
                .or_else(|| self.config.language_hint.clone()),
        };
        let scheduler = ChunkScheduler::new(
            RetryPolicy::new(self.config.retry.clone()),
            self.config.timeout.per_attempt_timeout(),
        );

        // Explicit cancellation aborts in-flight attempts; a timeout under
        // DrainInFlight only stops dispatch and lets workers finish.
        let worker_cancel = record.cancel.child_token();
        let dispatch_cancel = worker_cancel.child_token();

        let run = scheduler.execute(
            slices,
            Arc::clone(&self.backend),
            options,
            limits,
            dispatch_cancel.clone(),
            worker_cancel.clone(),
            Arc::clone(&record.progress),
            Arc::clone(&record.results),
        );

        let Some(limit) = self.task_timeout(record) else {
            run.await;
            return false;
        };

        tokio::pin!(run);
        let timed_out = tokio::select! {
            () = &mut run => false,
            () = sleep(limit) => {
                warn!(
                    task_id = %record.id,
                    timeout_secs = limit.as_secs(),
                    policy = ?self.config.timeout.timeout_policy,
                    "task timeout fired"
                );
                match self.config.timeout.timeout_policy {
                    TimeoutPolicy::DrainInFlight => dispatch_cancel.cancel(),
                    TimeoutPolicy::AbortInFlight => worker_cancel.cancel(),
                }
                true
            }
        };
        if timed_out {
            // Wait for workers to drain or observe the abort
            run.await;
        }
        timed_out
    }

    /// Effective task-level timeout: per-task override, then engine config
    fn task_timeout(&self, record: &TaskRecord) -> Option<Duration> {
        record
            .options
            .task_timeout_seconds
            .map(Duration::from_secs)
            .or_else(|| self.config.timeout.task_timeout())
    }

    /// Record the terminal state and publish the matching terminal event
    async fn finish(
        &self,
        record: &TaskRecord,
        terminal: TaskState,
        transcript: Option<MergedTranscript>,
        error: Option<String>,
    ) -> TaskState {
        let message = error.clone().unwrap_or_else(|| terminal.to_string());
        record.finish(terminal, transcript, error);

        let (phase, percent) = match terminal {
            TaskState::Completed => (ProgressPhase::Completed, 100),
            TaskState::PartiallyCompleted => (ProgressPhase::PartiallyCompleted, 100),
            TaskState::Cancelled => (ProgressPhase::Cancelled, record.progress.last_percent()),
            _ => (ProgressPhase::Failed, record.progress.last_percent()),
        };
        record.progress.publish_terminal(phase, percent, message).await;
        record.state()
    }
}
