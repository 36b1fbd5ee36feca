// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `SnapshotStore` capability set (C12).

use async_trait::async_trait;
use thiserror::Error;

use asap_error::{AsapError, ErrorCode};

use crate::snapshot::StateSnapshot;

/// Failures from any `SnapshotStore` implementation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// `save` was called with a version not strictly greater than the
    /// highest version already stored for this `task_id`.
    #[error("version {version} is not greater than the latest stored version for task {task_id}")]
    VersionNotIncreasing {
        /// Task the save was attempted against.
        task_id: String,
        /// The offending version.
        version: u64,
    },
    /// Underlying storage (filesystem, etc.) failed.
    #[error("snapshot store io error: {0}")]
    Io(String),
    /// Stored or supplied data failed to (de)serialize.
    #[error("snapshot store serialization error: {0}")]
    Serde(String),
}

impl SnapshotError {
    /// Convert to the shared error taxonomy type.
    #[must_use]
    pub fn into_asap_error(self) -> AsapError {
        match self {
            Self::VersionNotIncreasing { task_id, version } => {
                AsapError::new(ErrorCode::ValidationFailed, "snapshot version must strictly increase")
                    .with_context("task_id", task_id)
                    .with_context("version", version)
            }
            Self::Io(reason) | Self::Serde(reason) => {
                AsapError::new(ErrorCode::InternalError, reason)
            }
        }
    }
}

/// Versioned checkpoint storage for task state. Implementations must
/// guarantee that `list_versions` returns versions for a `task_id` in
/// strictly increasing order regardless of the order `save` was called.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`. Fails if `snapshot.version` is not strictly
    /// greater than every version already stored for its `task_id`.
    async fn save(&self, snapshot: StateSnapshot) -> Result<(), SnapshotError>;

    /// Fetch a snapshot for `task_id`: the specific `version` if given,
    /// otherwise the latest. Returns `Ok(None)` if nothing is stored,
    /// rather than an error.
    async fn get(&self, task_id: &str, version: Option<u64>) -> Result<Option<StateSnapshot>, SnapshotError>;

    /// All stored versions for `task_id`, strictly increasing.
    async fn list_versions(&self, task_id: &str) -> Result<Vec<u64>, SnapshotError>;

    /// Remove a specific version, or every version for `task_id` if
    /// `version` is `None`.
    async fn delete(&self, task_id: &str, version: Option<u64>) -> Result<(), SnapshotError>;
}
