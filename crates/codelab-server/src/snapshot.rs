//! Room document snapshot persistence.
//!
//! The relay never interprets sync frames, so snapshots arrive as opaque
//! blobs pushed by a client that holds the materialized document. The
//! store keeps the latest blob per room, last write wins.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

/// Snapshot persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Backend rejected or lost the write.
    #[error("snapshot store failure: {message}")]
    Store {
        /// Backend-provided detail.
        message: String,
    },
}

/// Persistence seam for room document snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the latest snapshot for a room, replacing any previous one.
    async fn save(&self, room: &str, blob: Bytes) -> Result<(), SnapshotError>;

    /// Load the most recent snapshot for a room, if one exists.
    async fn load(&self, room: &str) -> Result<Option<Bytes>, SnapshotError>;
}

/// In-memory snapshot store. Contents do not survive a restart.
#[derive(Default)]
pub struct MemorySnapshotStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with a stored snapshot.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, room: &str, blob: Bytes) -> Result<(), SnapshotError> {
        debug!(room, bytes = blob.len(), "snapshot saved");
        let _ = self.blobs.write().insert(room.to_owned(), blob);
        Ok(())
    }

    async fn load(&self, room: &str) -> Result<Option<Bytes>, SnapshotError> {
        Ok(self.blobs.read().get(room).cloned())
    }
}
