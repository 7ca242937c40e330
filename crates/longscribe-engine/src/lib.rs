//! Chunked transcription orchestration engine
//!
//! Takes long-form audio or video sources, splits them into overlapping
//! windows, transcribes the windows concurrently against an opaque speech
//! backend with per-window retry and timeout, and stitches the per-window
//! transcripts back into one globally-timed transcript. Failed windows leave
//! explicit gap markers instead of silent holes.
//!
//! The engine never touches a recognizer itself: callers plug in the
//! [`backend::TranscriptionBackend`] and [`backend::AudioExtractor`] ports.
//!
//! ```no_run
//! use longscribe_engine::engine::TranscriptionEngine;
//! use longscribe_engine::mock::{MockBackend, MockExtractor};
//! use longscribe_core::{EngineConfig, SourceDescriptor, TaskOptions};
//! use std::sync::Arc;
//!
//! # fn main() -> longscribe_core::Result<()> {
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let engine = TranscriptionEngine::new(
//!     Arc::new(MockBackend::new()),
//!     Arc::new(MockExtractor::new(1800.0)),
//!     EngineConfig::default(),
//! )?;
//! let task_id = engine.submit_task(
//!     SourceDescriptor::new("/data/lecture.mp4"),
//!     TaskOptions::default().with_language("en"),
//! );
//! let events = engine.subscribe_progress(task_id)?;
//! while let Ok(event) = events.recv().await {
//!     println!("{}: {}% {}", event.phase, event.percent, event.message);
//! }
//! # Ok(())
//! # })
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod artifacts;
pub mod backend;
pub mod batch;
pub mod engine;
pub mod mock;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod stitcher;
pub mod task;

pub use backend::{
    AudioExtractor, AudioSlice, BackendTranscript, ExtractedAudio, TranscribeOptions,
    TranscriptionBackend,
};
pub use engine::TranscriptionEngine;
pub use task::{TaskRecord, TaskStore};
