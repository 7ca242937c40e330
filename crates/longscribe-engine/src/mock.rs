//! Mock extraction and transcription collaborators for testing
//!
//! The mock backend is scriptable per window: a window can fail transiently a
//! fixed number of times before succeeding, or fail permanently. It also
//! tracks the maximum number of simultaneously in-flight calls so tests can
//! verify the scheduler's concurrency bound.

use crate::backend::{
    AudioExtractor, AudioSlice, BackendTranscript, ExtractedAudio, TranscribeOptions,
    TranscriptionBackend,
};
use async_trait::async_trait;
use longscribe_core::{AudioWindow, BackendError, ExtractionError, SourceDescriptor, TranscriptSegment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
enum FailurePlan {
    /// Fail transiently this many times, then succeed
    Transient(u32),
    /// Fail permanently on every attempt
    Permanent,
}

/// Scriptable mock transcription backend
#[derive(Debug, Default)]
pub struct MockBackend {
    /// Simulated processing delay per call
    delay: Duration,

    /// Scripted failures keyed by window index
    plans: Mutex<HashMap<usize, FailurePlan>>,

    /// Attempts observed per window index
    attempts: Mutex<HashMap<usize, u32>>,

    /// Calls currently in flight
    in_flight: AtomicUsize,

    /// High-water mark of simultaneously in-flight calls
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend with no delay and no scripted failures
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the simulated processing delay
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Script `times` transient failures for a window before it succeeds
    #[must_use]
    pub fn fail_transiently(self, window_index: usize, times: u32) -> Self {
        self.plans
            .lock()
            .insert(window_index, FailurePlan::Transient(times));
        self
    }

    /// Script permanent failure for a window
    #[must_use]
    pub fn fail_permanently(self, window_index: usize) -> Self {
        self.plans.lock().insert(window_index, FailurePlan::Permanent);
        self
    }

    /// Number of attempts observed for a window
    #[must_use]
    pub fn attempts_for(&self, window_index: usize) -> u32 {
        self.attempts.lock().get(&window_index).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously in-flight calls observed
    #[must_use]
    pub fn max_observed_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Deterministic transcript for a window: two segments splitting the
    /// window duration, chunk-local offsets
    fn transcript_for(window: AudioWindow) -> BackendTranscript {
        let duration = window.duration();
        let half = duration / 2.0;
        let index = window.index;
        BackendTranscript {
            segments: vec![
                TranscriptSegment::new(0.0, half, format!("window {index} first half"))
                    .with_confidence(0.9),
                TranscriptSegment::new(half, duration, format!("window {index} second half"))
                    .with_confidence(0.8),
            ],
            confidence: Some(0.85),
            language: Some("en".to_string()),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for MockBackend {
    async fn transcribe(
        &self,
        slice: &AudioSlice,
        _options: &TranscribeOptions,
    ) -> Result<BackendTranscript, BackendError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let index = slice.window.index;
        *self.attempts.lock().entry(index).or_insert(0) += 1;

        let outcome = {
            let mut plans = self.plans.lock();
            match plans.get_mut(&index) {
                Some(FailurePlan::Permanent) => {
                    Err(BackendError::permanent(format!("window {index}: malformed input")))
                }
                Some(FailurePlan::Transient(remaining)) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        Err(BackendError::transient(format!("window {index}: backend busy")))
                    } else {
                        Ok(Self::transcript_for(slice.window))
                    }
                }
                None => Ok(Self::transcript_for(slice.window)),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock audio extractor reporting a fixed duration
#[derive(Debug)]
pub struct MockExtractor {
    /// Duration reported for every source
    duration_seconds: f64,

    /// Whether extraction should fail
    fail_extraction: bool,

    /// Slices materialized so far
    slices_created: AtomicUsize,
}

impl MockExtractor {
    /// Create an extractor reporting the given source duration
    #[must_use]
    pub const fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            fail_extraction: false,
            slices_created: AtomicUsize::new(0),
        }
    }

    /// Configure extraction to fail with a decode error
    #[must_use]
    pub const fn with_failure(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// Number of slices this extractor materialized
    #[must_use]
    pub fn slices_created(&self) -> usize {
        self.slices_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioExtractor for MockExtractor {
    async fn extract(&self, source: &SourceDescriptor) -> Result<ExtractedAudio, ExtractionError> {
        if self.fail_extraction {
            return Err(ExtractionError::decode(&source.uri, "no audio stream"));
        }
        Ok(ExtractedAudio {
            path: PathBuf::from(format!("mock://{}", source.uri)),
            duration_seconds: self.duration_seconds,
        })
    }

    async fn slice(
        &self,
        _audio: &ExtractedAudio,
        window: AudioWindow,
        dest_dir: &Path,
    ) -> Result<AudioSlice, ExtractionError> {
        let path = dest_dir.join(format!("window_{:04}.wav", window.index));
        tokio::fs::write(&path, b"mock-pcm")
            .await
            .map_err(|e| ExtractionError::slice(window.index, e.to_string()))?;
        self.slices_created.fetch_add(1, Ordering::SeqCst);
        Ok(AudioSlice { window, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_for(index: usize) -> AudioSlice {
        AudioSlice {
            window: AudioWindow::new(index, 0.0, 10.0),
            path: PathBuf::from("/tmp/mock.wav"),
        }
    }

    #[tokio::test]
    async fn test_unscripted_window_succeeds() {
        let backend = MockBackend::new();
        let transcript = backend
            .transcribe(&slice_for(0), &TranscribeOptions::default())
            .await
            .unwrap();
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(backend.attempts_for(0), 1);
    }

    #[tokio::test]
    async fn test_transient_script_recovers() {
        let backend = MockBackend::new().fail_transiently(1, 2);
        let options = TranscribeOptions::default();

        for _ in 0..2 {
            let err = backend.transcribe(&slice_for(1), &options).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(backend.transcribe(&slice_for(1), &options).await.is_ok());
        assert_eq!(backend.attempts_for(1), 3);
    }

    #[tokio::test]
    async fn test_permanent_script_never_recovers() {
        let backend = MockBackend::new().fail_permanently(2);
        let options = TranscribeOptions::default();

        for _ in 0..3 {
            let err = backend.transcribe(&slice_for(2), &options).await.unwrap_err();
            assert!(!err.is_transient());
        }
    }

    #[tokio::test]
    async fn test_extractor_reports_duration_and_slices() {
        let extractor = MockExtractor::new(1234.5);
        let source = SourceDescriptor::new("talk.mp4");
        let audio = extractor.extract(&source).await.unwrap();
        assert_eq!(audio.duration_seconds, 1234.5);

        let dir = tempfile::tempdir().unwrap();
        let slice = extractor
            .slice(&audio, AudioWindow::new(0, 0.0, 300.0), dir.path())
            .await
            .unwrap();
        assert!(slice.path.exists());
        assert_eq!(extractor.slices_created(), 1);
    }

    #[tokio::test]
    async fn test_extractor_failure() {
        let extractor = MockExtractor::new(100.0).with_failure();
        let err = extractor
            .extract(&SourceDescriptor::new("broken.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Decode { .. }));
    }
}
