//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the gateway server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections across both channels.
    pub max_connections: usize,
    /// Maximum members per room (bounds broadcast amplification).
    pub max_room_members: usize,
    /// Per-connection outbound queue depth before messages drop.
    pub send_queue: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes (bounds sync frame size).
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 256,
            max_room_members: 32,
            send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_bounds() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.max_room_members, 32);
        assert_eq!(cfg.send_queue, 256);
        assert_eq!(cfg.max_message_size, 1024 * 1024);
    }

    #[test]
    fn default_heartbeat() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.max_room_members, cfg.max_room_members);
        assert_eq!(back.max_message_size, cfg.max_message_size);
    }
}
