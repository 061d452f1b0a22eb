//! Presence-channel wire protocol.
//!
//! Tagged JSON messages in both directions. Cursor payloads are opaque
//! `serde_json::Value`s, relayed without inspection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a client may send on the presence channel.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room, optionally (re)setting the display name.
    JoinRoom {
        /// Room key to join.
        room: String,
        /// Display name announced to other members.
        #[serde(default)]
        name: Option<String>,
    },
    /// Relay a cursor position to the other members of a room.
    CursorUpdate {
        /// Room key the cursor belongs to.
        room: String,
        /// Opaque cursor payload, forwarded verbatim.
        cursor: Value,
    },
    /// Leave a room explicitly.
    LeaveRoom {
        /// Room key to leave.
        room: String,
    },
}

/// Join or leave, carried inside a `presence` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    /// A member joined the room.
    Join,
    /// A member left the room (explicitly or by disconnecting).
    Leave,
}

/// Messages the gateway sends on the presence channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Direct acknowledgment to the joiner; never broadcast.
    RoomJoined {
        /// Room that was joined.
        room: String,
    },
    /// Join/leave notification fanned out to the other room members.
    Presence {
        /// Which transition happened.
        event: PresenceKind,
        /// Connection id of the member.
        id: String,
        /// Display name; present for joins when the client supplied one.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Cursor position relayed from another member.
    CursorUpdate {
        /// Connection id of the sender.
        id: String,
        /// Opaque cursor payload.
        cursor: Value,
    },
    /// Request-level failure; the connection stays open.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl ServerMessage {
    /// Serialize for the wire; infallible shapes only.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server message");
            String::new()
        })
    }
}
