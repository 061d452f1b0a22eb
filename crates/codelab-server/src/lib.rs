//! # codelab-server
//!
//! Axum HTTP + `WebSocket` gateway for collaborative code execution.
//!
//! - Connection registry: room-scoped membership index, pure in-memory
//! - Presence broadcaster: join/leave/cursor fan-out over `/ws`
//! - Document sync relay: opaque frame forwarding over `/sync`
//! - Execution proxy: `/executions` routes delegating to `codelab-exec`
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`
//!
//! Fan-out is at-most-once: per-connection mpsc queues with `try_send`,
//! slow consumers drop messages rather than stall the room.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod heartbeat;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod snapshot;
pub mod ws;

pub use config::ServerConfig;
pub use registry::ConnectionRegistry;
pub use server::{AppState, GatewayServer};
