//! Presence-channel client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Generate a fresh connection id.
pub fn next_connection_id() -> String {
    format!("conn_{}", Uuid::now_v7())
}

/// One connected presence-channel client.
///
/// The unit of fan-out addressing: messages destined for this client go
/// through its `tx` queue and are drained by the socket write task.
pub struct ClientConnection {
    /// Unique connection id, generated at accept time.
    pub id: String,
    /// Client-supplied display name; set on join, mutable only by rejoining.
    display_name: Mutex<Option<String>>,
    /// Send queue consumed by the connection's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last pong was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full queue.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection around its write queue.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            display_name: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Set the display name (happens on every `join_room`).
    pub fn set_display_name(&self, name: String) {
        *self.display_name.lock() = Some(name);
    }

    /// Current display name, if the client supplied one.
    pub fn display_name(&self) -> Option<String> {
        self.display_name.lock().clone()
    }

    /// Queue a text message for the client.
    ///
    /// Returns `false` if the queue is full or closed, incrementing the
    /// dropped-message counter (at-most-once delivery).
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat loop.
    ///
    /// Returns `true` if the client responded since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}
