// SPDX-License-Identifier: MIT OR Apache-2.0
//! Versioned, JSON-portable task state snapshots (C12): the
//! [`SnapshotStore`] capability set plus an in-memory and a file-backed
//! implementation.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod file;
mod memory;
mod snapshot;
mod store;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use snapshot::{NotJsonObject, StateSnapshot};
pub use store::{SnapshotError, SnapshotStore};
