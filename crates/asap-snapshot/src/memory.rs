// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory `SnapshotStore`, backed by a lock around an ordered map.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::snapshot::StateSnapshot;
use crate::store::{SnapshotError, SnapshotStore};

/// In-memory snapshot store. Versions are kept in a `BTreeMap` per
/// `task_id` so iteration is always in increasing version order,
/// independent of insertion order.
#[derive(Default)]
pub struct MemorySnapshotStore {
    tasks: Mutex<BTreeMap<String, BTreeMap<u64, StateSnapshot>>>,
}

impl MemorySnapshotStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: StateSnapshot) -> Result<(), SnapshotError> {
        let mut tasks = self.tasks.lock().expect("snapshot store lock poisoned");
        let versions = tasks.entry(snapshot.task_id.clone()).or_default();
        if let Some((&latest, _)) = versions.iter().next_back() {
            if snapshot.version <= latest {
                return Err(SnapshotError::VersionNotIncreasing {
                    task_id: snapshot.task_id,
                    version: snapshot.version,
                });
            }
        }
        versions.insert(snapshot.version, snapshot);
        Ok(())
    }

    async fn get(&self, task_id: &str, version: Option<u64>) -> Result<Option<StateSnapshot>, SnapshotError> {
        let tasks = self.tasks.lock().expect("snapshot store lock poisoned");
        let Some(versions) = tasks.get(task_id) else { return Ok(None) };
        let found = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        Ok(found.cloned())
    }

    async fn list_versions(&self, task_id: &str) -> Result<Vec<u64>, SnapshotError> {
        let tasks = self.tasks.lock().expect("snapshot store lock poisoned");
        Ok(tasks.get(task_id).map(|v| v.keys().copied().collect()).unwrap_or_default())
    }

    async fn delete(&self, task_id: &str, version: Option<u64>) -> Result<(), SnapshotError> {
        let mut tasks = self.tasks.lock().expect("snapshot store lock poisoned");
        match version {
            Some(v) => {
                if let Some(versions) = tasks.get_mut(task_id) {
                    versions.remove(&v);
                }
            }
            None => {
                tasks.remove(task_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(task_id: &str, version: u64) -> StateSnapshot {
        StateSnapshot::new(format!("{task_id}-{version}"), task_id, version, serde_json::json!({}), false, Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn versions_list_in_increasing_order_regardless_of_arrival() {
        let store = MemorySnapshotStore::new();
        store.save(snap("t1", 3)).await.unwrap();
        // out-of-order save is rejected; strictly increasing only.
        assert!(store.save(snap("t1", 2)).await.is_err());
        store.save(snap("t1", 4)).await.unwrap();
        assert_eq!(store.list_versions("t1").await.unwrap(), vec![3, 4]);
    }

    #[tokio::test]
    async fn get_without_version_returns_latest() {
        let store = MemorySnapshotStore::new();
        store.save(snap("t1", 1)).await.unwrap();
        store.save(snap("t1", 2)).await.unwrap();
        let latest = store.get("t1", None).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn get_missing_task_returns_none() {
        let store = MemorySnapshotStore::new();
        assert!(store.get("absent", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_single_version_leaves_others() {
        let store = MemorySnapshotStore::new();
        store.save(snap("t1", 1)).await.unwrap();
        store.save(snap("t1", 2)).await.unwrap();
        store.delete("t1", Some(1)).await.unwrap();
        assert_eq!(store.list_versions("t1").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn delete_without_version_removes_all() {
        let store = MemorySnapshotStore::new();
        store.save(snap("t1", 1)).await.unwrap();
        store.delete("t1", None).await.unwrap();
        assert!(store.list_versions("t1").await.unwrap().is_empty());
    }
}
