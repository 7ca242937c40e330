//! Error types for the transcription engine

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the speech-recognition backend
///
/// The engine only distinguishes two failure classes: transient failures are
/// retried with backoff, permanent failures are recorded immediately as a
/// window-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Transient backend failure (overload, connection loss, timeout)
    #[error("Transient backend failure: {message}")]
    Transient {
        /// Failure description
        message: String,
    },

    /// Permanent backend failure (malformed input, unsupported audio)
    #[error("Permanent backend failure: {message}")]
    Permanent {
        /// Failure description
        message: String,
    },
}

impl BackendError {
    /// Create a transient backend error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a permanent backend error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Check whether the error class should be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors raised by the audio extraction collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The source could not be decoded into a waveform
    #[error("Failed to decode source {uri}: {message}")]
    Decode {
        /// Source descriptor that failed
        uri: String,
        /// Decoder error message
        message: String,
    },

    /// The source does not exist or cannot be accessed
    #[error("Source not accessible: {uri}")]
    SourceNotAccessible {
        /// Source descriptor that failed
        uri: String,
    },

    /// A per-window slice could not be materialized
    #[error("Failed to slice window {index}: {message}")]
    Slice {
        /// Window index
        index: usize,
        /// Failure message
        message: String,
    },
}

impl ExtractionError {
    /// Create a decode error
    pub fn decode(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            uri: source.into(),
            message: message.into(),
        }
    }

    /// Create a source-not-accessible error
    pub fn not_accessible(source: impl Into<String>) -> Self {
        Self::SourceNotAccessible {
            uri: source.into(),
        }
    }

    /// Create a slice error
    pub fn slice(index: usize, message: impl Into<String>) -> Self {
        Self::Slice {
            index,
            message: message.into(),
        }
    }
}

/// Main error type for the transcription engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration parameters (fatal, surfaced immediately)
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// A configuration field failed validation
    #[error("Validation error: {field} - {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Audio extraction failed (fatal to the task, not retried at this layer)
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Backend failure that survived the retry policy
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Task lookup failed
    #[error("Task not found: {id}")]
    TaskNotFound {
        /// Task id that was requested
        id: uuid::Uuid,
    },

    /// Batch lookup failed
    #[error("Batch not found: {id}")]
    BatchNotFound {
        /// Batch id that was requested
        id: uuid::Uuid,
    },

    /// Scheduler or worker pool failure
    #[error("Scheduler error: {message}")]
    Scheduler {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a scheduler error
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Create a task-not-found error
    #[must_use]
    pub const fn task_not_found(id: uuid::Uuid) -> Self {
        Self::TaskNotFound { id }
    }

    /// Create a batch-not-found error
    #[must_use]
    pub const fn batch_not_found(id: uuid::Uuid) -> Self {
        Self::BatchNotFound { id }
    }

    /// Check whether this error aborts a task outright
    ///
    /// Only configuration and extraction errors are fatal; backend failures
    /// are window-level data handled by the task state machine.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::Validation { .. } | Self::Extraction(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_classes() {
        let transient = BackendError::transient("backend overloaded");
        assert!(transient.is_transient());

        let permanent = BackendError::permanent("corrupt audio");
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_configuration("overlap >= chunk length");
        assert!(matches!(err, Error::InvalidConfiguration { .. }));

        let err = Error::validation("chunk_length_seconds", "must be positive");
        assert!(matches!(err, Error::Validation { .. }));

        let id = uuid::Uuid::new_v4();
        let err = Error::task_not_found(id);
        assert!(format!("{err}").contains(&id.to_string()));
    }

    #[test]
    fn test_fatality() {
        assert!(Error::invalid_configuration("bad").is_fatal());
        assert!(Error::from(ExtractionError::not_accessible("/x.mp4")).is_fatal());
        assert!(!Error::from(BackendError::transient("busy")).is_fatal());
        assert!(!Error::scheduler("slot lost").is_fatal());
    }

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::decode("video.mp4", "no audio stream");
        let display = format!("{err}");
        assert!(display.contains("video.mp4"));
        assert!(display.contains("no audio stream"));

        let err = ExtractionError::slice(3, "seek failed");
        assert!(format!("{err}").contains("window 3"));
    }
}
