//! In-memory task registry. `asap-task` models the state machine itself
//! ([`Task`], [`Status`]); nothing upstream owns storage, so the server
//! keeps its own map, the same way the teacher's daemon keeps its own
//! `receipts` map alongside a stateless runtime.

use std::collections::HashMap;
use std::sync::Arc;

use asap_task::{InvalidTransition, Status, Task};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Shared, lock-guarded registry of known tasks.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, Task>>>,
}

impl TaskStore {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a task.
    pub async fn put(&self, task: Task) {
        self.inner.write().await.insert(task.id.clone(), task);
    }

    /// Look up a task by id.
    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.read().await.get(task_id).cloned()
    }

    /// Transition `task_id` to `next`, persisting the new value on
    /// success. The task's own state lock is this store's per-entry
    /// write guard; transitions on different tasks never contend.
    pub async fn transition(
        &self,
        task_id: &str,
        next: Status,
        now: DateTime<Utc>,
        progress: Option<f64>,
    ) -> Result<Task, TaskStoreError> {
        let mut guard = self.inner.write().await;
        let current = guard.get(task_id).cloned().ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;
        let updated = current.transition(next, now, progress)?;
        guard.insert(task_id.to_string(), updated.clone());
        Ok(updated)
    }

    /// Record a progress notification for `task_id`, which must already
    /// be [`Status::Working`]. Does not otherwise change its status.
    pub async fn update_progress(
        &self,
        task_id: &str,
        progress: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskStoreError> {
        let mut guard = self.inner.write().await;
        let current = guard.get(task_id).cloned().ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;
        let updated = current.update_progress(progress, now)?;
        guard.insert(task_id.to_string(), updated.clone());
        Ok(updated)
    }
}

/// Failures from looking up or transitioning a stored task.
#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    /// No task is registered under this id.
    #[error("task {0} not found")]
    NotFound(String),
    /// The requested status transition is not valid from the task's
    /// current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl TaskStoreError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> asap_error::AsapError {
        match self {
            Self::NotFound(task_id) => {
                asap_error::AsapError::new(asap_error::ErrorCode::ValidationFailed, "task not found")
                    .with_context("task_id", task_id)
            }
            Self::InvalidTransition(e) => e.into_asap_error(),
        }
    }
}
