//! Core types for the chunked transcription engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous time interval of the source audio scheduled for independent
/// transcription
///
/// Windows are produced once by the planner in strictly increasing index
/// order and are immutable thereafter. Consecutive windows overlap by the
/// configured amount except possibly the final window, which may be shorter
/// than the nominal chunk length.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AudioWindow {
    /// Position of this window in the planned sequence
    pub index: usize,

    /// Start of the window in seconds from the beginning of the source
    pub start: f64,

    /// End of the window in seconds from the beginning of the source
    pub end: f64,
}

impl AudioWindow {
    /// Create a new window
    #[must_use]
    pub const fn new(index: usize, start: f64, end: f64) -> Self {
        Self { index, start, end }
    }

    /// Window duration in seconds
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check whether this window temporally overlaps the next one
    #[must_use]
    pub fn overlaps(&self, next: &Self) -> bool {
        self.end > next.start
    }
}

/// A transcribed segment with timing information
///
/// Offsets are local to the chunk as returned by the backend; the stitcher
/// rebases them to global time before merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    /// Start offset in seconds
    pub start: f64,

    /// End offset in seconds
    pub end: f64,

    /// Transcribed text
    pub text: String,

    /// Confidence score (0.0-1.0)
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    /// Create a new segment
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            confidence: None,
        }
    }

    /// Attach a confidence score
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Segment duration in seconds
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Return a copy shifted by `offset` seconds
    #[must_use]
    pub fn rebased(&self, offset: f64) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
            confidence: self.confidence,
        }
    }
}

/// Terminal outcome of one window's transcription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// The window was transcribed
    Success,
    /// The window failed after the retry policy was exhausted
    Failed {
        /// Failure reason
        reason: String,
    },
}

impl ChunkOutcome {
    /// Create a failed outcome
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Check whether the window succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of transcribing one window
///
/// Produced once by the retrying worker that owns the window and consumed
/// exactly once by the stitcher. Never mutated after being written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkResult {
    /// The window this result belongs to
    pub window: AudioWindow,

    /// Chunk-local segments returned by the backend
    pub segments: Vec<TranscriptSegment>,

    /// Overall backend confidence for this chunk (0.0-1.0)
    pub backend_confidence: Option<f32>,

    /// Number of attempts consumed (1 = first try succeeded)
    pub attempts: u32,

    /// Terminal outcome for this window
    pub outcome: ChunkOutcome,
}

impl ChunkResult {
    /// Create a successful result
    #[must_use]
    pub const fn success(
        window: AudioWindow,
        segments: Vec<TranscriptSegment>,
        backend_confidence: Option<f32>,
        attempts: u32,
    ) -> Self {
        Self {
            window,
            segments,
            backend_confidence,
            attempts,
            outcome: ChunkOutcome::Success,
        }
    }

    /// Create a failed result
    pub fn failed(window: AudioWindow, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            window,
            segments: Vec::new(),
            backend_confidence: None,
            attempts,
            outcome: ChunkOutcome::failed(reason),
        }
    }
}

/// Task lifecycle states
///
/// `Completed`, `PartiallyCompleted`, `Failed` and `Cancelled` are terminal.
/// A task transitions to a terminal state only after every window has a
/// terminal chunk result or the task was explicitly cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted, not yet picked up
    #[default]
    Pending,
    /// Extracting audio and computing windows
    Planning,
    /// Windows are being transcribed
    Dispatching,
    /// All windows terminal, merging partial transcripts
    Merging,
    /// Every window succeeded
    Completed,
    /// At least one window succeeded, at least one failed
    PartiallyCompleted,
    /// Every window failed, or a fatal error occurred
    Failed,
    /// Cancelled by external request
    Cancelled,
}

impl TaskState {
    /// Check whether the state is terminal
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyCompleted | Self::Failed | Self::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Planning => write!(f, "planning"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Merging => write!(f, "merging"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Phase reported in progress events
///
/// Finer-grained than [`TaskState`]: extraction and transcription are
/// distinct phases even though both happen while the task is non-terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Task accepted, waiting to start
    Queued,
    /// Computing chunk windows
    Planning,
    /// Extracting and slicing audio
    Extracting,
    /// Transcribing windows
    Transcribing,
    /// Merging per-window transcripts
    Merging,
    /// Terminal: completed
    Completed,
    /// Terminal: partially completed
    PartiallyCompleted,
    /// Terminal: failed
    Failed,
    /// Terminal: cancelled
    Cancelled,
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Planning => write!(f, "planning"),
            Self::Extracting => write!(f, "extracting"),
            Self::Transcribing => write!(f, "transcribing"),
            Self::Merging => write!(f, "merging"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Progress event published per task
///
/// Ordered per task by emission time. Delivery is at-least-once; consumers
/// must tolerate duplicates keyed by `(task_id, phase, percent)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    /// Task the event belongs to
    pub task_id: Uuid,

    /// Current phase
    pub phase: ProgressPhase,

    /// Overall progress (0-100), monotonically non-decreasing per task
    pub percent: u8,

    /// Human-readable status message
    pub message: String,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create a new event stamped with the current time
    pub fn new(task_id: Uuid, phase: ProgressPhase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            task_id,
            phase,
            percent: percent.min(100),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Opaque reference to a transcription source (file path, URL, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Source location
    pub uri: String,

    /// Optional display label
    pub label: Option<String>,
}

impl SourceDescriptor {
    /// Create a descriptor from a location
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            label: None,
        }
    }

    /// Attach a display label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({})", self.uri),
            None => write!(f, "{}", self.uri),
        }
    }
}

/// Per-task processing options
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Language hint passed to the backend (None for auto-detect)
    pub language: Option<String>,

    /// Override of the engine-wide per-task concurrency limit
    pub concurrency_limit: Option<usize>,

    /// Task-level timeout; on expiry the task is cancelled according to the
    /// configured timeout policy
    pub task_timeout_seconds: Option<u64>,
}

impl TaskOptions {
    /// Set the language hint
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set a per-task concurrency limit
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Set a task-level timeout
    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.task_timeout_seconds = Some(seconds);
        self
    }
}

/// Interval of the source audio whose transcription failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GapInterval {
    /// Index of the failed window
    pub window_index: usize,

    /// Start of the gap in seconds
    pub start: f64,

    /// End of the gap in seconds
    pub end: f64,
}

impl GapInterval {
    /// Render the gap marker inserted into merged text
    #[must_use]
    pub fn marker(&self) -> String {
        format!("[inaudible {:.1}s-{:.1}s]", self.start, self.end)
    }
}

/// Final merged transcript for a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MergedTranscript {
    /// Full transcript text with gap markers where windows failed
    pub text: String,

    /// Kept segments in global time, strictly ordered
    pub segments: Vec<TranscriptSegment>,

    /// Duration-weighted mean confidence of kept segments
    pub confidence: Option<f32>,

    /// Whether any window failed and left a gap
    pub partial: bool,

    /// Intervals covered by gap markers
    pub failed_windows: Vec<GapInterval>,
}

/// Point-in-time view of a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    /// Task id
    pub id: Uuid,

    /// Source being transcribed
    pub source: SourceDescriptor,

    /// Current state
    pub state: TaskState,

    /// Overall progress (0-100)
    pub percent: u8,

    /// Merged transcript, present once the task reached `Completed` or
    /// `PartiallyCompleted`; a cancelled task carries the partial transcript
    /// of whatever windows finished before cancellation
    pub transcript: Option<MergedTranscript>,

    /// Error message for failed tasks
    pub error: Option<String>,

    /// Number of planned windows (0 before planning finishes)
    pub total_windows: usize,

    /// Number of windows with a terminal result so far
    pub completed_windows: usize,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Terminal transition timestamp
    pub completed_at: Option<DateTime<Utc>>,
}

/// Batch lifecycle status, derived from member task states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one member task is non-terminal
    Running,
    /// All member tasks completed
    Completed,
    /// Some member tasks succeeded, others did not
    PartiallyCompleted,
    /// All member tasks failed
    Failed,
    /// The batch was cancelled
    Cancelled,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Point-in-time view of a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSnapshot {
    /// Batch id
    pub id: Uuid,

    /// Member task ids in submission order
    pub task_ids: Vec<Uuid>,

    /// Derived batch status
    pub status: BatchStatus,

    /// Number of member tasks
    pub total_tasks: usize,

    /// Number of member tasks in a terminal state
    pub terminal_tasks: usize,
}

/// Aggregate engine statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineStats {
    /// Tasks submitted since startup
    pub tasks_submitted: u64,

    /// Tasks that reached `Completed`
    pub tasks_completed: u64,

    /// Tasks that reached `PartiallyCompleted`
    pub tasks_partially_completed: u64,

    /// Tasks that reached `Failed`
    pub tasks_failed: u64,

    /// Tasks that reached `Cancelled`
    pub tasks_cancelled: u64,

    /// Total audio duration processed, in seconds
    pub audio_seconds_processed: f64,
}
