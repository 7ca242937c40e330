//! Ports to the external audio-extraction and speech-recognition collaborators
//!
//! The engine consumes these traits, it never implements them: extraction and
//! recognition are black boxes. [`crate::mock`] provides scriptable
//! implementations for tests.

use async_trait::async_trait;
use longscribe_core::{
    AudioWindow, BackendError, ExtractionError, SourceDescriptor, TranscriptSegment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Handle to the normalized mono waveform extracted from a source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedAudio {
    /// Location of the normalized waveform
    pub path: PathBuf,

    /// Total duration in seconds
    pub duration_seconds: f64,
}

/// A materialized per-window audio slice handed to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSlice {
    /// The window this slice covers
    pub window: AudioWindow,

    /// Location of the slice on disk; owned by the task's artifact scope
    pub path: PathBuf,
}

/// Options forwarded to the backend for a single transcription call
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Language hint (None for auto-detect)
    pub language: Option<String>,
}

/// What the backend returns for one audio slice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BackendTranscript {
    /// Segments with offsets local to the slice
    pub segments: Vec<TranscriptSegment>,

    /// Overall confidence for the slice (0.0-1.0)
    pub confidence: Option<f32>,

    /// Detected language, if the backend reports one
    pub language: Option<String>,
}

/// External speech-recognition capability
///
/// Implementations must be safe to call concurrently; the scheduler issues up
/// to the configured concurrency limit of simultaneous calls.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe one bounded audio slice
    async fn transcribe(
        &self,
        slice: &AudioSlice,
        options: &TranscribeOptions,
    ) -> Result<BackendTranscript, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// External audio-extraction capability
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Extract the source into a normalized waveform and report its duration
    async fn extract(&self, source: &SourceDescriptor) -> Result<ExtractedAudio, ExtractionError>;

    /// Materialize the audio for one window into `dest_dir`
    async fn slice(
        &self,
        audio: &ExtractedAudio,
        window: AudioWindow,
        dest_dir: &Path,
    ) -> Result<AudioSlice, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcribe_options_default() {
        let options = TranscribeOptions::default();
        assert!(options.language.is_none());
    }

    #[test]
    fn test_backend_transcript_serde() {
        let transcript = BackendTranscript {
            segments: vec![TranscriptSegment::new(0.0, 2.0, "hello world")],
            confidence: Some(0.91),
            language: Some("en".to_string()),
        };
        let json = serde_json::to_string(&transcript).unwrap();
        let back: BackendTranscript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, transcript);
    }
}
