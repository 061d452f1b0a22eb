//! Connection registry: live connections indexed by id and grouped by room.
//!
//! Pure in-memory structure, no I/O. Both directions of the membership
//! relation live under one lock so the symmetric invariant
//! (`room ∈ rooms_of(c)` iff `c ∈ members_of(room)`) can never be
//! observed half-updated. All operations are idempotent. Reads hand out
//! snapshots so fan-out never iterates under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::ClientConnection;

#[derive(Default)]
struct RegistryState {
    /// Live connections by id.
    connections: HashMap<String, Arc<ClientConnection>>,
    /// Room key → member connection ids.
    members: HashMap<String, HashSet<String>>,
    /// Connection id → joined room keys.
    joined: HashMap<String, HashSet<String>>,
}

/// Registry of presence-channel connections and their room membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection. Registering the same id twice replaces the
    /// previous entry (its memberships are kept).
    pub fn register(&self, connection: Arc<ClientConnection>) {
        let mut state = self.state.write();
        let _ = state.connections.insert(connection.id.clone(), connection);
    }

    /// Drop a connection and all of its room memberships.
    ///
    /// No-op for unknown ids. Rooms whose member set becomes empty cease
    /// to exist.
    pub fn unregister(&self, connection_id: &str) {
        let mut state = self.state.write();
        let _ = state.connections.remove(connection_id);
        if let Some(rooms) = state.joined.remove(connection_id) {
            for room in rooms {
                if let Some(members) = state.members.get_mut(&room) {
                    let _ = members.remove(connection_id);
                    if members.is_empty() {
                        let _ = state.members.remove(&room);
                    }
                }
            }
        }
    }

    /// Add a connection to a room.
    ///
    /// Returns `true` if the membership is new; joining twice is a no-op.
    /// Unknown connection ids are ignored (the transport already closed).
    pub fn join_room(&self, connection_id: &str, room: &str) -> bool {
        let mut state = self.state.write();
        if !state.connections.contains_key(connection_id) {
            return false;
        }
        let inserted = state
            .members
            .entry(room.to_owned())
            .or_default()
            .insert(connection_id.to_owned());
        let _ = state
            .joined
            .entry(connection_id.to_owned())
            .or_default()
            .insert(room.to_owned());
        inserted
    }

    /// Remove a connection from a room; leaving a room not joined is a no-op.
    pub fn leave_room(&self, connection_id: &str, room: &str) {
        let mut state = self.state.write();
        if let Some(members) = state.members.get_mut(room) {
            let _ = members.remove(connection_id);
            if members.is_empty() {
                let _ = state.members.remove(room);
            }
        }
        if let Some(rooms) = state.joined.get_mut(connection_id) {
            let _ = rooms.remove(room);
            if rooms.is_empty() {
                let _ = state.joined.remove(connection_id);
            }
        }
    }

    /// Snapshot of a room's member connections.
    pub fn members_of(&self, room: &str) -> Vec<Arc<ClientConnection>> {
        let state = self.state.read();
        state
            .members
            .get(room)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of members currently in a room.
    pub fn member_count(&self, room: &str) -> usize {
        self.state.read().members.get(room).map_or(0, HashSet::len)
    }

    /// Snapshot of the rooms a connection has joined.
    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.state
            .read()
            .joined
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a live connection by id.
    pub fn connection(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.state.read().connections.get(connection_id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Number of rooms that currently have members.
    pub fn room_count(&self) -> usize {
        self.state.read().members.len()
    }
}
