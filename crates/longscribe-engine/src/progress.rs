//! Per-task progress publishing
//!
//! Each task owns a bounded channel of [`ProgressEvent`]s. Events are ordered
//! per task and the percent is clamped monotonically non-decreasing.
//! Non-terminal events are dropped when the subscriber lags; terminal events
//! wait for channel space so the final state always reaches the subscriber.

use longscribe_core::{ProgressEvent, ProgressPhase};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Percent reached when planning finishes
pub const PERCENT_PLANNED: u8 = 10;

/// Percent reached when extraction and slicing finish
pub const PERCENT_EXTRACTED: u8 = 25;

/// Percent reached when every window has a terminal result
pub const PERCENT_DISPATCHED: u8 = 95;

/// Default progress channel capacity per task
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Map completed-window count onto the dispatching percent band (25-95)
#[must_use]
pub fn dispatch_percent(completed_windows: usize, total_windows: usize) -> u8 {
    if total_windows == 0 {
        return PERCENT_DISPATCHED;
    }
    let band = f64::from(PERCENT_DISPATCHED - PERCENT_EXTRACTED);
    let fraction = completed_windows as f64 / total_windows as f64;
    PERCENT_EXTRACTED + (band * fraction.clamp(0.0, 1.0)) as u8
}

/// Publisher side of a task's progress channel
#[derive(Debug)]
pub struct ProgressPublisher {
    task_id: Uuid,
    sender: async_channel::Sender<ProgressEvent>,
    /// Used to evict the oldest buffered event when the channel is full
    evictor: async_channel::Receiver<ProgressEvent>,
    last_percent: AtomicU8,
}

impl ProgressPublisher {
    /// Create a publisher/subscriber pair for a task
    #[must_use]
    pub fn channel(task_id: Uuid) -> (Arc<Self>, async_channel::Receiver<ProgressEvent>) {
        let (sender, receiver) = async_channel::bounded(DEFAULT_CHANNEL_CAPACITY);
        (
            Arc::new(Self {
                task_id,
                sender,
                evictor: receiver.clone(),
                last_percent: AtomicU8::new(0),
            }),
            receiver,
        )
    }

    /// Task this publisher belongs to
    #[must_use]
    pub const fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Highest percent published so far
    #[must_use]
    pub fn last_percent(&self) -> u8 {
        self.last_percent.load(Ordering::SeqCst)
    }

    /// Clamp a percent value so it never decreases for this task
    fn monotonic(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        self.last_percent
            .fetch_max(percent, Ordering::SeqCst)
            .max(percent)
    }

    /// Publish a non-terminal event
    ///
    /// When the subscriber lags and the channel is full, the oldest buffered
    /// event is evicted to make room.
    pub fn publish(&self, phase: ProgressPhase, percent: u8, message: impl Into<String>) {
        let percent = self.monotonic(percent);
        let event = ProgressEvent::new(self.task_id, phase, percent, message);
        if let Err(async_channel::TrySendError::Full(event)) = self.sender.try_send(event) {
            debug!(task_id = %self.task_id, %phase, "progress subscriber lagging, oldest event evicted");
            let _ = self.evictor.try_recv();
            let _ = self.sender.try_send(event);
        }
    }

    /// Publish a terminal event; always delivered while a subscriber exists
    pub async fn publish_terminal(&self, phase: ProgressPhase, percent: u8, message: impl Into<String>) {
        let percent = self.monotonic(percent);
        let event = ProgressEvent::new(self.task_id, phase, percent, message);
        if let Err(async_channel::TrySendError::Full(event)) = self.sender.try_send(event) {
            let _ = self.evictor.try_recv();
            // Fails only when every receiver is gone, which is fine to ignore
            let _ = self.sender.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_percent_band() {
        assert_eq!(dispatch_percent(0, 10), 25);
        assert_eq!(dispatch_percent(5, 10), 60);
        assert_eq!(dispatch_percent(10, 10), 95);
        assert_eq!(dispatch_percent(0, 0), 95);
    }

    #[tokio::test]
    async fn test_events_are_ordered_and_monotonic() {
        let (publisher, receiver) = ProgressPublisher::channel(Uuid::new_v4());

        publisher.publish(ProgressPhase::Planning, 10, "planned");
        publisher.publish(ProgressPhase::Extracting, 25, "extracted");
        // A stale lower percent must not go backwards
        publisher.publish(ProgressPhase::Transcribing, 20, "stale");
        publisher
            .publish_terminal(ProgressPhase::Completed, 100, "done")
            .await;

        let percents: Vec<u8> = [
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.percent)
        .collect();

        assert_eq!(percents, vec![10, 25, 25, 100]);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_drops_nonterminal_events() {
        let (publisher, receiver) = ProgressPublisher::channel(Uuid::new_v4());

        for i in 0..(DEFAULT_CHANNEL_CAPACITY + 50) {
            publisher.publish(ProgressPhase::Transcribing, (i % 90) as u8, "tick");
        }
        // Channel holds at most its capacity; the rest were dropped silently
        assert_eq!(receiver.len(), DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_terminal_event_survives_closed_receiver() {
        let (publisher, receiver) = ProgressPublisher::channel(Uuid::new_v4());
        drop(receiver);
        // Must not hang or panic
        publisher
            .publish_terminal(ProgressPhase::Failed, 100, "failed")
            .await;
    }
}
