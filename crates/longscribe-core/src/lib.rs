//! Shared types, configuration and errors for the `longscribe` engine
//!
//! This crate holds everything the orchestration engine and its callers need
//! to agree on: the time-window and transcript data model, the task and batch
//! lifecycle types, the progress event stream payloads, the configuration
//! surface, and the error taxonomy that separates fatal configuration and
//! extraction failures from retryable backend failures.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ChunkingConfig, ConcurrencyConfig, EngineConfig, RetryConfig, TimeoutConfig, TimeoutPolicy,
};
pub use error::{BackendError, Error, ExtractionError, Result};
pub use types::{
    AudioWindow, BatchSnapshot, BatchStatus, ChunkOutcome, ChunkResult, EngineStats, GapInterval,
    MergedTranscript, ProgressEvent, ProgressPhase, SourceDescriptor, TaskOptions, TaskSnapshot,
    TaskState, TranscriptSegment,
};
