//! Presence fan-out: join/leave/cursor events to room members.
//!
//! Built on an injected [`ConnectionRegistry`]; no persistence, no replay.
//! The sender is always excluded from its own broadcast. Delivery is
//! at-most-once: a full client queue drops the event.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{PresenceKind, ServerMessage};
use crate::registry::ConnectionRegistry;

/// Failures surfaced to the presence-channel client.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// Room member cap reached.
    #[error("room {room} is full (limit {limit})")]
    RoomFull {
        /// Room that was joined.
        room: String,
        /// Configured member cap.
        limit: usize,
    },
}

/// Turns room events into fan-out notifications.
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
    max_room_members: usize,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over a registry with a per-room member cap.
    pub fn new(registry: Arc<ConnectionRegistry>, max_room_members: usize) -> Self {
        Self {
            registry,
            max_room_members,
        }
    }

    /// The registry this broadcaster indexes.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handle `join_room`: register membership, ack the joiner directly,
    /// announce the join to every *other* member.
    pub fn join(
        &self,
        connection_id: &str,
        room: &str,
        name: Option<String>,
    ) -> Result<(), PresenceError> {
        let already_member = self
            .registry
            .rooms_of(connection_id)
            .iter()
            .any(|r| r == room);
        if !already_member && self.registry.member_count(room) >= self.max_room_members {
            return Err(PresenceError::RoomFull {
                room: room.to_owned(),
                limit: self.max_room_members,
            });
        }

        if let Some(conn) = self.registry.connection(connection_id) {
            if let Some(name) = name {
                conn.set_display_name(name);
            }
        }
        let newly_joined = self.registry.join_room(connection_id, room);

        if let Some(conn) = self.registry.connection(connection_id) {
            let ack = Arc::new(ServerMessage::RoomJoined { room: room.into() }.to_json());
            let _ = conn.send(ack);

            if newly_joined {
                let announce = ServerMessage::Presence {
                    event: PresenceKind::Join,
                    id: connection_id.into(),
                    name: conn.display_name(),
                };
                self.broadcast_except(room, connection_id, &announce);
            }
        }
        debug!(connection_id, room, "joined room");
        Ok(())
    }

    /// Handle `cursor_update`: relay to every other member of the room.
    pub fn cursor_update(&self, connection_id: &str, room: &str, cursor: Value) {
        let update = ServerMessage::CursorUpdate {
            id: connection_id.into(),
            cursor,
        };
        self.broadcast_except(room, connection_id, &update);
    }

    /// Handle explicit `leave_room`: announce to the remaining members,
    /// then drop the membership.
    pub fn leave(&self, connection_id: &str, room: &str) {
        self.announce_leave(connection_id, room);
        self.registry.leave_room(connection_id, room);
        debug!(connection_id, room, "left room");
    }

    /// Handle transport closure: one leave event per joined room, each
    /// scoped to that room's remaining members, then unregister.
    ///
    /// Membership is read *before* removal so every remaining member is
    /// notified exactly once.
    pub fn disconnect(&self, connection_id: &str) {
        let rooms = self.registry.rooms_of(connection_id);
        for room in &rooms {
            self.announce_leave(connection_id, room);
        }
        self.registry.unregister(connection_id);
        debug!(connection_id, room_count = rooms.len(), "disconnected");
    }

    fn announce_leave(&self, connection_id: &str, room: &str) {
        let event = ServerMessage::Presence {
            event: PresenceKind::Leave,
            id: connection_id.into(),
            name: None,
        };
        self.broadcast_except(room, connection_id, &event);
    }

    /// Serialize once, fan out to a snapshot of the room minus the sender.
    fn broadcast_except(&self, room: &str, sender_id: &str, message: &ServerMessage) {
        let json = Arc::new(message.to_json());
        let members = self.registry.members_of(room);
        for member in members {
            if member.id == sender_id {
                continue;
            }
            if !member.send(Arc::clone(&json)) {
                warn!(
                    connection_id = %member.id,
                    room,
                    drops = member.drop_count(),
                    "presence queue full, event dropped"
                );
            }
        }
    }
}
