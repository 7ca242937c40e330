//! Batch grouping of tasks under a shared concurrency ceiling
//!
//! A batch has no state machine of its own: its status is derived on demand
//! from member task states. All member tasks share one semaphore, so the
//! batch-wide number of in-flight backend calls never exceeds the configured
//! ceiling no matter how many member tasks run concurrently.

use crate::task::TaskStore;
use dashmap::DashMap;
use longscribe_core::{BatchSnapshot, BatchStatus, Error, Result, TaskState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

/// One submitted batch
#[derive(Debug)]
pub struct BatchRecord {
    /// Batch id
    pub id: Uuid,

    task_ids: Vec<Uuid>,
    permits: Arc<Semaphore>,
    cancelled: AtomicBool,
}

impl BatchRecord {
    /// Create a record over member tasks with the given shared ceiling
    #[must_use]
    pub fn new(task_ids: Vec<Uuid>, batch_concurrency_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            task_ids,
            permits: Arc::new(Semaphore::new(batch_concurrency_limit.max(1))),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Member task ids in submission order
    #[must_use]
    pub fn task_ids(&self) -> &[Uuid] {
        &self.task_ids
    }

    /// Shared semaphore capping batch-wide in-flight backend calls
    #[must_use]
    pub fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }

    /// Whether the batch was explicitly cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Derive the batch status from member task states
    ///
    /// An explicit cancel only shows as `Cancelled` once a member actually
    /// ended `Cancelled`; a cancel request that arrives after every member
    /// completed leaves the derived status untouched.
    fn status(&self, states: &[TaskState]) -> BatchStatus {
        if states.iter().any(|state| !state.is_terminal()) {
            return BatchStatus::Running;
        }
        if self.is_cancelled() && states.contains(&TaskState::Cancelled) {
            return BatchStatus::Cancelled;
        }
        let completed = states
            .iter()
            .filter(|state| **state == TaskState::Completed)
            .count();
        let with_output = states
            .iter()
            .filter(|state| {
                matches!(state, TaskState::Completed | TaskState::PartiallyCompleted)
            })
            .count();
        if completed == states.len() {
            BatchStatus::Completed
        } else if with_output == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::PartiallyCompleted
        }
    }
}

/// In-memory registry of batches
#[derive(Debug, Default)]
pub struct BatchStore {
    batches: DashMap<Uuid, Arc<BatchRecord>>,
}

impl BatchStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch
    pub fn insert(&self, record: Arc<BatchRecord>) {
        self.batches.insert(record.id, record);
    }

    /// Look up a batch
    pub fn get(&self, id: Uuid) -> Result<Arc<BatchRecord>> {
        self.batches
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::BatchNotFound { id })
    }

    /// Point-in-time snapshot with the status derived from member tasks
    ///
    /// Member tasks evicted from the task store count as terminal.
    pub fn snapshot(&self, id: Uuid, tasks: &TaskStore) -> Result<BatchSnapshot> {
        let batch = self.get(id)?;
        let states: Vec<TaskState> = batch
            .task_ids
            .iter()
            .filter_map(|task_id| tasks.get(*task_id).ok())
            .map(|record| record.state())
            .collect();
        let terminal_tasks = states.iter().filter(|state| state.is_terminal()).count()
            + (batch.task_ids.len() - states.len());

        Ok(BatchSnapshot {
            id: batch.id,
            task_ids: batch.task_ids.clone(),
            status: batch.status(&states),
            total_tasks: batch.task_ids.len(),
            terminal_tasks,
        })
    }

    /// Cancel a batch: requests cancellation of every member task
    pub fn cancel(&self, id: Uuid, tasks: &TaskStore) -> Result<()> {
        let batch = self.get(id)?;
        batch.cancelled.store(true, Ordering::SeqCst);
        info!(batch_id = %batch.id, members = batch.task_ids.len(), "batch cancellation requested");
        for task_id in &batch.task_ids {
            // Already-terminal or evicted members are skipped silently
            if let Ok(record) = tasks.get(*task_id) {
                record.request_cancel();
            }
        }
        Ok(())
    }

    /// Number of registered batches
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRecord;
    use longscribe_core::{SourceDescriptor, TaskOptions};

    fn batch_with_members(
        states: &[TaskState],
    ) -> (BatchStore, TaskStore, Uuid) {
        let tasks = TaskStore::new();
        let mut ids = Vec::new();
        for state in states {
            let record = TaskRecord::new(SourceDescriptor::new("member.wav"), TaskOptions::default());
            if state.is_terminal() {
                record.finish(*state, None, None);
            }
            ids.push(record.id);
            tasks.insert(record);
        }
        let batches = BatchStore::new();
        let batch = BatchRecord::new(ids, 4);
        let id = batch.id;
        batches.insert(batch);
        (batches, tasks, id)
    }

    #[test]
    fn test_running_while_any_member_is_active() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Completed, TaskState::Pending]);
        let snapshot = batches.snapshot(id, &tasks).unwrap();
        assert_eq!(snapshot.status, BatchStatus::Running);
        assert_eq!(snapshot.terminal_tasks, 1);
        assert_eq!(snapshot.total_tasks, 2);
    }

    #[test]
    fn test_completed_when_all_members_complete() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Completed, TaskState::Completed]);
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::Completed
        );
    }

    #[test]
    fn test_partial_when_outcomes_mix() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Completed, TaskState::Failed]);
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::PartiallyCompleted
        );

        let (batches, tasks, id) =
            batch_with_members(&[TaskState::PartiallyCompleted, TaskState::Completed]);
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::PartiallyCompleted
        );
    }

    #[test]
    fn test_failed_when_no_member_produced_output() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Failed, TaskState::Cancelled]);
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::Failed
        );
    }

    #[test]
    fn test_cancel_marks_batch_and_members() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Pending, TaskState::Pending]);
        batches.cancel(id, &tasks).unwrap();

        // Members are still winding down, so the batch is still running
        let snapshot = batches.snapshot(id, &tasks).unwrap();
        assert_eq!(snapshot.status, BatchStatus::Running);
        for task_id in &snapshot.task_ids {
            assert!(tasks.get(*task_id).unwrap().cancel_requested());
        }

        for task_id in snapshot.task_ids {
            tasks.get(task_id).unwrap().finish(TaskState::Cancelled, None, None);
        }
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::Cancelled
        );
    }

    #[test]
    fn test_cancel_after_all_members_completed_stays_completed() {
        let (batches, tasks, id) =
            batch_with_members(&[TaskState::Completed, TaskState::Completed]);
        batches.cancel(id, &tasks).unwrap();

        // The request had nothing left to cancel; the derived status stands
        assert_eq!(
            batches.snapshot(id, &tasks).unwrap().status,
            BatchStatus::Completed
        );
    }

    #[test]
    fn test_unknown_batch() {
        let batches = BatchStore::new();
        let tasks = TaskStore::new();
        assert!(matches!(
            batches.snapshot(Uuid::new_v4(), &tasks),
            Err(Error::BatchNotFound { .. })
        ));
    }

    #[test]
    fn test_shared_permits_are_one_semaphore() {
        let batch = BatchRecord::new(vec![], 2);
        let a = batch.permits();
        let b = batch.permits();
        let held = a.try_acquire_many(2).unwrap();
        assert!(b.try_acquire().is_err());
        drop(held);
        assert!(b.try_acquire().is_ok());
    }
}
