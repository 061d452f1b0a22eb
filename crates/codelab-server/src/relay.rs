//! Document sync relay: opaque frame forwarding between room peers.
//!
//! Runs on its own WebSocket path with its own membership table — the
//! room is fixed at connect time (query parameter) and independent of the
//! presence channel, so there is no ordering guarantee between the two.
//! Frames are never parsed, stored, or merged; convergence belongs to the
//! sync protocol running at each endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One opaque unit of sync-protocol data, forwarded byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncFrame {
    /// Text payload.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
}

/// Failures attaching a peer to a room.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Room member cap reached.
    #[error("sync room {room} is full (limit {limit})")]
    RoomFull {
        /// Room that was requested.
        room: String,
        /// Configured member cap.
        limit: usize,
    },
}

/// Generate a fresh sync-peer id.
pub fn next_peer_id() -> String {
    format!("peer_{}", Uuid::now_v7())
}

/// Fan-out table for sync-channel peers, keyed by room.
pub struct SyncRelay {
    rooms: RwLock<HashMap<String, HashMap<String, mpsc::Sender<Arc<SyncFrame>>>>>,
    max_room_members: usize,
}

impl SyncRelay {
    /// Create a relay with a per-room member cap.
    pub fn new(max_room_members: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_room_members,
        }
    }

    /// Attach a peer's send queue to a room.
    ///
    /// Membership is stable for the peer's lifetime; there is no re-join.
    pub fn attach(
        &self,
        room: &str,
        peer_id: &str,
        tx: mpsc::Sender<Arc<SyncFrame>>,
    ) -> Result<(), RelayError> {
        let mut rooms = self.rooms.write();
        let members = rooms.entry(room.to_owned()).or_default();
        if !members.contains_key(peer_id) && members.len() >= self.max_room_members {
            return Err(RelayError::RoomFull {
                room: room.to_owned(),
                limit: self.max_room_members,
            });
        }
        let _ = members.insert(peer_id.to_owned(), tx);
        debug!(peer_id, room, members = members.len(), "sync peer attached");
        Ok(())
    }

    /// Detach a peer; empty rooms are removed. Idempotent.
    pub fn detach(&self, room: &str, peer_id: &str) {
        let mut rooms = self.rooms.write();
        if let Some(members) = rooms.get_mut(room) {
            let _ = members.remove(peer_id);
            if members.is_empty() {
                let _ = rooms.remove(room);
            }
        }
        debug!(peer_id, room, "sync peer detached");
    }

    /// Forward a frame to every other current member of the room.
    ///
    /// The member set is snapshotted before sending so concurrent
    /// attach/detach cannot skip or duplicate a delivery. Full queues
    /// drop the frame for that peer only (at-most-once).
    pub fn broadcast(&self, room: &str, sender_id: &str, frame: SyncFrame) {
        let targets: Vec<(String, mpsc::Sender<Arc<SyncFrame>>)> = {
            let rooms = self.rooms.read();
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .filter(|(id, _)| id.as_str() != sender_id)
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return,
            }
        };

        let frame = Arc::new(frame);
        for (peer_id, tx) in targets {
            if tx.try_send(Arc::clone(&frame)).is_err() {
                warn!(peer_id, room, "sync queue full, frame dropped");
            }
        }
    }

    /// Current member count of a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.read().get(room).map_or(0, HashMap::len)
    }

    /// Number of rooms with at least one peer.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}
