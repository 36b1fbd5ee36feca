// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed `SnapshotStore`: one JSON file per `task_id`/version, written
//! via temp-file-then-rename so a process crash mid-write never corrupts an
//! existing snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::snapshot::StateSnapshot;
use crate::store::{SnapshotError, SnapshotStore};

/// Snapshot store that persists each version as `<root>/<task_id>/<version>.json`.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Use `root` as the storage directory, creating it lazily on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    fn snapshot_path(&self, task_id: &str, version: u64) -> PathBuf {
        self.task_dir(task_id).join(format!("{version}.json"))
    }

    async fn read_versions(&self, task_id: &str) -> Result<Vec<u64>, SnapshotError> {
        let dir = self.task_dir(task_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::Io(e.to_string())),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SnapshotError::Io(e.to_string()))? {
            if let Some(version) = parse_version(&entry.path()) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
        let dir = path.parent().expect("snapshot path always has a parent");
        tokio::fs::create_dir_all(dir).await.map_err(|e| SnapshotError::Io(e.to_string()))?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| SnapshotError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|e| SnapshotError::Io(e.to_string()))?;
        Ok(())
    }
}

fn parse_version(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: StateSnapshot) -> Result<(), SnapshotError> {
        let versions = self.read_versions(&snapshot.task_id).await?;
        if let Some(&latest) = versions.last() {
            if snapshot.version <= latest {
                return Err(SnapshotError::VersionNotIncreasing {
                    task_id: snapshot.task_id,
                    version: snapshot.version,
                });
            }
        }
        let path = self.snapshot_path(&snapshot.task_id, snapshot.version);
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| SnapshotError::Serde(e.to_string()))?;
        self.write_atomic(&path, &bytes).await?;
        debug!(target: "asap.snapshot", task_id = %snapshot.task_id, version = snapshot.version, "saved snapshot");
        Ok(())
    }

    async fn get(&self, task_id: &str, version: Option<u64>) -> Result<Option<StateSnapshot>, SnapshotError> {
        let version = match version {
            Some(v) => v,
            None => match self.read_versions(task_id).await?.last() {
                Some(&v) => v,
                None => return Ok(None),
            },
        };
        let path = self.snapshot_path(task_id, version);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot = serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Serde(e.to_string()))?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::Io(e.to_string())),
        }
    }

    async fn list_versions(&self, task_id: &str) -> Result<Vec<u64>, SnapshotError> {
        self.read_versions(task_id).await
    }

    async fn delete(&self, task_id: &str, version: Option<u64>) -> Result<(), SnapshotError> {
        match version {
            Some(v) => {
                let path = self.snapshot_path(task_id, v);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(SnapshotError::Io(e.to_string())),
                }
            }
            None => {
                let dir = self.task_dir(task_id);
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(SnapshotError::Io(e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(task_id: &str, version: u64) -> StateSnapshot {
        StateSnapshot::new(format!("{task_id}-{version}"), task_id, version, serde_json::json!({"n": version}), true, Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(snap("t1", 1)).await.unwrap();
        let back = store.get("t1", Some(1)).await.unwrap().unwrap();
        assert_eq!(back.data.get("n").unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_non_increasing_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(snap("t1", 5)).await.unwrap();
        assert!(store.save(snap("t1", 5)).await.is_err());
        assert!(store.save(snap("t1", 4)).await.is_err());
    }

    #[tokio::test]
    async fn list_versions_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(snap("t1", 1)).await.unwrap();
        store.save(snap("t1", 2)).await.unwrap();
        store.save(snap("t1", 3)).await.unwrap();
        assert_eq!(store.list_versions("t1").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_snapshot_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.get("never-saved", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_all_removes_the_task_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(snap("t1", 1)).await.unwrap();
        store.delete("t1", None).await.unwrap();
        assert!(store.list_versions("t1").await.unwrap().is_empty());
    }
}
