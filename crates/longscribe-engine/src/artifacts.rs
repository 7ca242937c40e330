//! Scoped ownership of per-window temporary audio slices
//!
//! Every task owns exactly one [`ArtifactScope`]. Slices are materialized
//! inside the scope's temporary directory and the whole directory is removed
//! when the scope is released or dropped, so cleanup holds on every exit
//! path: success, failure, cancellation, and abrupt teardown of the task
//! future.

use longscribe_core::Result;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary-artifact scope for one task
#[derive(Debug)]
pub struct ArtifactScope {
    task_id: Uuid,
    dir: Option<TempDir>,
    registered: Mutex<Vec<PathBuf>>,
}

impl ArtifactScope {
    /// Create a scope backed by a fresh temporary directory
    pub fn for_task(task_id: Uuid) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("longscribe-task-")
            .tempdir()?;
        debug!(%task_id, dir = %dir.path().display(), "artifact scope created");
        Ok(Self {
            task_id,
            dir: Some(dir),
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Create a scope under a specific base directory
    pub fn in_dir(task_id: Uuid, base: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("longscribe-task-")
            .tempdir_in(base)?;
        Ok(Self {
            task_id,
            dir: Some(dir),
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Directory slices should be materialized into
    ///
    /// Returns `None` once the scope has been released.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Record a materialized slice path
    pub fn register(&self, path: PathBuf) {
        self.registered.lock().push(path);
    }

    /// Number of registered artifacts still present on disk
    #[must_use]
    pub fn live_artifacts(&self) -> usize {
        self.registered
            .lock()
            .iter()
            .filter(|path| path.exists())
            .count()
    }

    /// Release all artifacts now instead of waiting for drop
    pub fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(task_id = %self.task_id, dir = %path.display(), error = %e,
                    "failed to remove artifact directory");
            } else {
                debug!(task_id = %self.task_id, "artifact scope released");
            }
        }
        self.registered.lock().clear();
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        // TempDir removes the directory recursively when still held
        if self.dir.is_some() {
            debug!(task_id = %self.task_id, "artifact scope dropped with live directory");
        }
    }
}
