//! Retrying worker: one window's backend call under timeout and backoff
//!
//! The backoff schedule is modelled as an explicit `(attempt, next_delay)`
//! state advanced by a pure step function, so the policy is testable without
//! real time. Exhausted retries produce a failed [`ChunkResult`]; failure is
//! data for the task state machine, never an error crossing the scheduler.

use crate::backend::{AudioSlice, TranscribeOptions, TranscriptionBackend};
use crate::progress::{dispatch_percent, ProgressPublisher};
use longscribe_core::{ChunkResult, ProgressPhase, RetryConfig};
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff and retry policy derived from [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum attempts per window, including the first
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Deterministic backoff delay after the given attempt (1-based)
    ///
    /// `base * exponential_base^(attempt - 1)`, capped at the maximum delay.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.config.exponential_base.powi(exponent.min(63) as i32);
        let millis = (self.config.base_delay_ms as f64 * factor)
            .min(self.config.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Apply jitter to a computed delay
    ///
    /// Scales the delay by a random factor in `[0.5, 1.0)` to avoid
    /// synchronized retries across workers.
    #[must_use]
    pub fn jittered(&self, delay: Duration) -> Duration {
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.0);
        delay.mul_f64(factor)
    }
}

/// Retry loop state: the current attempt and the delay to wait before the
/// next one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Delay before the next attempt, without jitter
    pub next_delay: Duration,
}

impl RetryState {
    /// State before the first attempt
    #[must_use]
    pub fn first(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            next_delay: policy.delay_after(1),
        }
    }

    /// Whether another attempt remains after the current one
    #[must_use]
    pub const fn has_next(&self, policy: &RetryPolicy) -> bool {
        self.attempt < policy.max_attempts()
    }

    /// Advance to the next attempt
    #[must_use]
    pub fn step(self, policy: &RetryPolicy) -> Self {
        let attempt = self.attempt + 1;
        Self {
            attempt,
            next_delay: policy.delay_after(attempt),
        }
    }
}

/// Run one window's transcription with timeout, retry and backoff
///
/// Returns `None` when cancellation interrupts the attempt loop; otherwise a
/// terminal [`ChunkResult`] (success or failed-after-exhausted-retries).
/// Emits a progress update for every attempt.
#[allow(clippy::too_many_arguments)]
pub async fn run_window(
    backend: &dyn TranscriptionBackend,
    slice: &AudioSlice,
    options: &TranscribeOptions,
    policy: &RetryPolicy,
    per_attempt_timeout: Duration,
    cancel: &CancellationToken,
    progress: &ProgressPublisher,
    total_windows: usize,
    completed_windows: usize,
) -> Option<ChunkResult> {
    let window = slice.window;
    let mut state = RetryState::first(policy);
    let mut last_error = String::new();

    loop {
        progress.publish(
            ProgressPhase::Transcribing,
            dispatch_percent(completed_windows, total_windows),
            format!(
                "window {} of {}: attempt {} of {}",
                window.index + 1,
                total_windows,
                state.attempt,
                policy.max_attempts()
            ),
        );

        let attempt = tokio::select! {
            () = cancel.cancelled() => {
                debug!(window = window.index, "cancelled before attempt finished");
                return None;
            }
            outcome = timeout(per_attempt_timeout, backend.transcribe(slice, options)) => outcome,
        };

        match attempt {
            Ok(Ok(transcript)) => {
                debug!(
                    window = window.index,
                    attempts = state.attempt,
                    segments = transcript.segments.len(),
                    "window transcribed"
                );
                return Some(ChunkResult::success(
                    window,
                    transcript.segments,
                    transcript.confidence,
                    state.attempt,
                ));
            }
            Ok(Err(err)) if !err.is_transient() => {
                warn!(window = window.index, error = %err, "permanent backend failure");
                return Some(ChunkResult::failed(window, state.attempt, err.to_string()));
            }
            Ok(Err(err)) => {
                warn!(
                    window = window.index,
                    attempt = state.attempt,
                    error = %err,
                    "transient backend failure"
                );
                last_error = err.to_string();
            }
            Err(_elapsed) => {
                warn!(
                    window = window.index,
                    attempt = state.attempt,
                    timeout_secs = per_attempt_timeout.as_secs_f64(),
                    "backend attempt timed out"
                );
                last_error = format!(
                    "attempt timed out after {:.0}s",
                    per_attempt_timeout.as_secs_f64()
                );
            }
        }

        if !state.has_next(policy) {
            return Some(ChunkResult::failed(
                window,
                state.attempt,
                format!("exhausted {} attempts: {last_error}", policy.max_attempts()),
            ));
        }

        let delay = policy.jittered(state.next_delay);
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(window = window.index, "cancelled during backoff");
                return None;
            }
            () = sleep(delay) => {}
        }
        state = state.step(policy);
    }
}
