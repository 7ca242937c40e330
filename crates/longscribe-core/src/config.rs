//! Configuration for the transcription engine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Chunk planning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Nominal chunk length in seconds
    pub chunk_length_seconds: f64,

    /// Overlap between consecutive chunks in seconds
    pub overlap_seconds: f64,

    /// Sources at or below this duration are transcribed as a single window
    pub min_duration_for_chunking_seconds: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_length_seconds: 300.0,
            overlap_seconds: 2.0,
            min_duration_for_chunking_seconds: 600.0,
        }
    }
}

impl ChunkingConfig {
    /// Validate chunking parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_length_seconds <= 0.0 {
            return Err(Error::validation(
                "chunk_length_seconds",
                "must be positive",
            ));
        }
        if self.overlap_seconds < 0.0 {
            return Err(Error::validation("overlap_seconds", "must be non-negative"));
        }
        if self.min_duration_for_chunking_seconds <= 0.0 {
            return Err(Error::validation(
                "min_duration_for_chunking_seconds",
                "must be positive",
            ));
        }
        if self.overlap_seconds >= self.chunk_length_seconds {
            return Err(Error::validation(
                "overlap_seconds",
                "must be smaller than chunk_length_seconds",
            ));
        }
        Ok(())
    }
}

/// Retry and backoff configuration for backend calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum attempts per window, including the first one
    pub max_attempts: u32,

    /// Base delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Cap on the computed backoff delay, in milliseconds
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt
    pub exponential_base: f64,

    /// Whether to randomize delays to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Validate retry parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation("max_attempts", "must be at least 1"));
        }
        if self.exponential_base < 1.0 {
            return Err(Error::validation("exponential_base", "must be >= 1.0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::validation(
                "max_delay_ms",
                "must be >= base_delay_ms",
            ));
        }
        Ok(())
    }

    /// Base delay as a [`Duration`]
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum delay as a [`Duration`]
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Concurrency ceilings for chunk dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Maximum simultaneously in-flight backend calls per task
    pub task_concurrency_limit: usize,

    /// Additional ceiling shared across all tasks of one batch
    pub batch_concurrency_limit: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            task_concurrency_limit: 3,
            batch_concurrency_limit: 4,
        }
    }
}

impl ConcurrencyConfig {
    /// Validate concurrency parameters
    pub fn validate(&self) -> Result<()> {
        if self.task_concurrency_limit == 0 {
            return Err(Error::validation(
                "task_concurrency_limit",
                "must be at least 1",
            ));
        }
        if self.batch_concurrency_limit == 0 {
            return Err(Error::validation(
                "batch_concurrency_limit",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// What a task-level timeout does to in-flight windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Stop dispatching new windows, let in-flight attempts finish
    DrainInFlight,
    /// Stop dispatching and request cancellation of in-flight attempts
    #[default]
    AbortInFlight,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Timeout for a single backend attempt, in seconds
    pub per_attempt_timeout_seconds: u64,

    /// Optional task-level timeout, in seconds
    pub task_timeout_seconds: Option<u64>,

    /// Behavior when the task-level timeout fires
    pub timeout_policy: TimeoutPolicy,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout_seconds: 300,
            task_timeout_seconds: None,
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl TimeoutConfig {
    /// Validate timeout parameters
    pub fn validate(&self) -> Result<()> {
        if self.per_attempt_timeout_seconds == 0 {
            return Err(Error::validation(
                "per_attempt_timeout_seconds",
                "must be at least 1",
            ));
        }
        if self.task_timeout_seconds == Some(0) {
            return Err(Error::validation(
                "task_timeout_seconds",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }

    /// Per-attempt timeout as a [`Duration`]
    #[must_use]
    pub const fn per_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.per_attempt_timeout_seconds)
    }

    /// Task-level timeout as a [`Duration`], if configured
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_seconds.map(Duration::from_secs)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    /// Chunk planning
    pub chunking: ChunkingConfig,

    /// Retry and backoff policy
    pub retry: RetryConfig,

    /// Concurrency ceilings
    pub concurrency: ConcurrencyConfig,

    /// Timeouts
    pub timeout: TimeoutConfig,

    /// Default language hint passed to the backend (None for auto-detect)
    pub language_hint: Option<String>,

    /// Base directory for per-task slice artifacts (system temp when unset)
    pub artifact_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from `longscribe.toml` (optional) and `LONGSCRIBE_*`
    /// environment variables
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("longscribe").required(false))
            .add_source(config::Environment::with_prefix("LONGSCRIBE").separator("__"))
            .build()
            .map_err(|e| Error::invalid_configuration(e.to_string()))?;

        let loaded: Self = settings
            .try_deserialize()
            .map_err(|e| Error::invalid_configuration(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retry.validate()?;
        self.concurrency.validate()?;
        self.timeout.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_length_seconds, 300.0);
        assert_eq!(config.chunking.overlap_seconds, 2.0);
        assert_eq!(config.chunking.min_duration_for_chunking_seconds, 600.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.concurrency.task_concurrency_limit, 3);
        assert_eq!(config.timeout.timeout_policy, TimeoutPolicy::AbortInFlight);
    }

    #[test]
    fn test_chunking_validation() {
        let mut chunking = ChunkingConfig::default();
        chunking.overlap_seconds = chunking.chunk_length_seconds;
        assert!(chunking.validate().is_err());

        let negative = ChunkingConfig {
            chunk_length_seconds: -1.0,
            ..ChunkingConfig::default()
        };
        assert!(negative.validate().is_err());

        let zero_min = ChunkingConfig {
            min_duration_for_chunking_seconds: 0.0,
            ..ChunkingConfig::default()
        };
        assert!(zero_min.validate().is_err());

        // Zero overlap is valid: windows abut with nothing to deduplicate
        let zero_overlap = ChunkingConfig {
            overlap_seconds: 0.0,
            ..ChunkingConfig::default()
        };
        assert!(zero_overlap.validate().is_ok());
    }

    #[test]
    fn test_retry_validation() {
        let zero_attempts = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let inverted_delays = RetryConfig {
            base_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..RetryConfig::default()
        };
        assert!(inverted_delays.validate().is_err());

        assert_eq!(RetryConfig::default().base_delay(), Duration::from_secs(1));
        assert_eq!(RetryConfig::default().max_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_concurrency_validation() {
        let zero = ConcurrencyConfig {
            task_concurrency_limit: 0,
            ..ConcurrencyConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_timeout_validation() {
        let zero_attempt = TimeoutConfig {
            per_attempt_timeout_seconds: 0,
            ..TimeoutConfig::default()
        };
        assert!(zero_attempt.validate().is_err());

        let zero_task = TimeoutConfig {
            task_timeout_seconds: Some(0),
            ..TimeoutConfig::default()
        };
        assert!(zero_task.validate().is_err());

        let config = TimeoutConfig {
            task_timeout_seconds: Some(120),
            ..TimeoutConfig::default()
        };
        assert_eq!(config.task_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig {
            language_hint: Some("zh".to_string()),
            artifact_dir: Some(PathBuf::from("/var/tmp/longscribe")),
            ..EngineConfig::default()
        };
        let rendered = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
