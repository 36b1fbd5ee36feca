// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `StateSnapshot` data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A versioned, JSON-portable checkpoint of a task's working data.
/// Immutable once saved: a new version is created rather than mutating an
/// existing one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Task this snapshot belongs to.
    pub task_id: String,
    /// Monotonically increasing version within `task_id`.
    pub version: u64,
    /// JSON-serializable checkpoint data.
    pub data: Map<String, Value>,
    /// Whether this snapshot is a durable checkpoint (eligible for
    /// failover restore) versus an intermediate, best-effort save.
    pub checkpoint: bool,
    /// When this snapshot was created.
    pub created_at: DateTime<Utc>,
}

/// A value could not be normalized into a JSON-portable map.
#[derive(Debug, Error)]
#[error("snapshot data is not a JSON object: {0}")]
pub struct NotJsonObject(String);

impl StateSnapshot {
    /// Build a snapshot from any `Serialize` value, rejecting anything
    /// that does not normalize to a JSON object (datetimes, sets, and
    /// other non-JSON-safe types must be converted by the caller first).
    pub fn new(
        id: impl Into<String>,
        task_id: impl Into<String>,
        version: u64,
        data: impl Serialize,
        checkpoint: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, NotJsonObject> {
        let value = serde_json::to_value(&data).map_err(|e| NotJsonObject(e.to_string()))?;
        let Value::Object(data) = value else {
            return Err(NotJsonObject("value serialized to a non-object JSON type".to_string()));
        };
        Ok(Self { id: id.into(), task_id: task_id.into(), version, data, checkpoint, created_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_a_serializable_map() {
        let snap =
            StateSnapshot::new("s1", "t1", 1, serde_json::json!({"step": 3}), true, Utc::now()).unwrap();
        assert_eq!(snap.data.get("step").unwrap(), 3);
    }

    #[test]
    fn rejects_non_object_data() {
        let err = StateSnapshot::new("s1", "t1", 1, serde_json::json!([1, 2]), false, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("non-object"));
    }
}
