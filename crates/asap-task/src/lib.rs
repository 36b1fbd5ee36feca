// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task status state machine (C11): a closed set of statuses, a validated
//! transition table, and immutable task mutation.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use asap_error::{AsapError, ErrorCode};

/// A task's lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Accepted by the server, not yet dispatched to a handler.
    Submitted,
    /// A handler is actively working the task.
    Working,
    /// The handler is waiting on additional input from the sender.
    InputRequired,
    /// Execution is suspended, pending an explicit resume.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected before any work began.
    Rejected,
}

impl Status {
    /// The wire representation, matching the `snake_case` serde rename
    /// used for this enum.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input_required",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this status is final: no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected)
    }

    /// Statuses this status may transition to. Unknown or terminal
    /// statuses return an empty slice rather than panicking, so a corrupt
    /// stored status cannot crash dispatch.
    #[must_use]
    pub fn valid_transitions(self) -> &'static [Status] {
        match self {
            Self::Submitted => &[Self::Working, Self::Rejected],
            Self::Working => &[
                Self::Completed,
                Self::Failed,
                Self::Cancelled,
                Self::InputRequired,
                Self::Paused,
            ],
            Self::InputRequired => &[Self::Working, Self::Cancelled],
            Self::Paused => &[Self::Working, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected => &[],
        }
    }

    /// Whether `next` is a valid transition from this status.
    #[must_use]
    pub fn can_transition_to(self, next: Status) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Failure transitioning a task to a new status.
#[derive(Debug, Error)]
#[error("cannot transition task {task_id} from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// The task that was rejected.
    pub task_id: String,
    /// The status it was in.
    pub from: Status,
    /// The status requested.
    pub to: Status,
}

impl InvalidTransition {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        AsapError::new(ErrorCode::InvalidTransition, self.to_string())
            .with_context("task_id", self.task_id)
            .with_context("from", format!("{:?}", self.from))
            .with_context("to", format!("{:?}", self.to))
    }
}

/// A unit of work tracked by the server: created once by the first
/// `task.request` accepted for it, thereafter only mutated via
/// [`Task::transition`], which returns a new value rather than mutating in
/// place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Conversation this task belongs to.
    pub conversation_id: String,
    /// Parent task, when this task was spawned by another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    /// Current lifecycle status.
    pub status: Status,
    /// Fractional progress in `[0.0, 1.0]`, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// When the task was first created.
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in [`Status::Submitted`].
    #[must_use]
    pub fn new(id: impl Into<String>, conversation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            parent_task_id: None,
            status: Status::Submitted,
            progress: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a parent task id (builder-style, for use right after
    /// [`Task::new`]).
    #[must_use]
    pub fn with_parent(mut self, parent_task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_task_id.into());
        self
    }

    /// Produce a new task value with `status` set to `next`, `updated_at`
    /// set to `now`, and `progress` replaced if given. Fails with
    /// [`InvalidTransition`] if `next` is not reachable from the current
    /// status; the original task is never mutated.
    pub fn transition(
        &self,
        next: Status,
        now: DateTime<Utc>,
        progress: Option<f64>,
    ) -> Result<Task, InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { task_id: self.id.clone(), from: self.status, to: next });
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = now;
        if progress.is_some() {
            updated.progress = progress;
        }
        Ok(updated)
    }

    /// Record a progress notification without changing `status`. Only
    /// valid while the task is [`Status::Working`]; a progress update
    /// carries no authority to move the task in or out of that state.
    pub fn update_progress(&self, progress: Option<f64>, now: DateTime<Utc>) -> Result<Task, InvalidTransition> {
        if self.status != Status::Working {
            return Err(InvalidTransition { task_id: self.id.clone(), from: self.status, to: self.status });
        }
        let mut updated = self.clone();
        updated.updated_at = now;
        if progress.is_some() {
            updated.progress = progress;
        }
        Ok(updated)
    }
}
