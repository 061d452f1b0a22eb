//! `GatewayServer` — Axum HTTP + WebSocket gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use codelab_exec::{ExecError, ExecutionRequest, JobOrchestrator};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::relay::SyncRelay;
use crate::shutdown::ShutdownCoordinator;
use crate::snapshot::{MemorySnapshotStore, SnapshotStore};
use crate::ws::{serve_presence_socket, serve_sync_socket};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Presence-channel connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Presence event fan-out.
    pub presence: Arc<PresenceBroadcaster>,
    /// Sync-channel frame relay.
    pub relay: Arc<SyncRelay>,
    /// Code execution orchestrator.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Room snapshot persistence.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
}

/// The gateway server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Create a new gateway with an in-memory snapshot store.
    pub fn new(config: ServerConfig, orchestrator: JobOrchestrator) -> Self {
        Self::with_snapshot_store(config, orchestrator, Arc::new(MemorySnapshotStore::new()))
    }

    /// Create a new gateway with a caller-provided snapshot store.
    pub fn with_snapshot_store(
        config: ServerConfig,
        orchestrator: JobOrchestrator,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceBroadcaster::new(
            Arc::clone(&registry),
            config.max_room_members,
        ));
        let relay = Arc::new(SyncRelay::new(config.max_room_members));
        Self {
            state: AppState {
                registry,
                presence,
                relay,
                orchestrator: Arc::new(orchestrator),
                snapshots,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                config,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(banner_handler))
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .route("/sync", get(sync_handler))
            .route("/executions", post(execute_handler))
            .route("/executions/{token}", get(execution_status_handler))
            .route(
                "/rooms/{room}/snapshot",
                post(save_snapshot_handler).get(load_snapshot_handler),
            )
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve. Returns the bound address and the serve task.
    ///
    /// Cancelling the shutdown coordinator stops accepting connections
    /// and lets in-flight requests drain.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        info!(%local_addr, "gateway listening");
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "gateway serve failed");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /
async fn banner_handler() -> &'static str {
    "codelab gateway"
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.room_count(),
        state.relay.room_count(),
    ))
}

/// GET /ws — presence channel upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.registry.connection_count() >= state.config.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }
    let presence = Arc::clone(&state.presence);
    let shutdown = state.shutdown.token();
    let config = state.config.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| serve_presence_socket(socket, presence, config, shutdown))
}

#[derive(Deserialize)]
struct SyncQuery {
    room: Option<String>,
}

/// GET /sync?room=<key> — sync channel upgrade, room fixed at connect time.
async fn sync_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SyncQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(room) = query.room.filter(|r| !r.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing room query parameter").into_response();
    };
    let relay = Arc::clone(&state.relay);
    let shutdown = state.shutdown.token();
    let send_queue = state.config.send_queue;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| serve_sync_socket(socket, room, relay, send_queue, shutdown))
}

/// POST /executions — run code through the compute service, blocking
/// until it finishes or the poll budget is spent.
async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> Response {
    match state.orchestrator.execute(&request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => exec_error_response(&e),
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    base64_encoded: bool,
}

/// GET /executions/{token} — single status query, no polling.
async fn execution_status_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state
        .orchestrator
        .fetch_result(&token, query.base64_encoded)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => exec_error_response(&e),
    }
}

/// POST /rooms/{room}/snapshot — store the latest document blob.
async fn save_snapshot_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
    body: Bytes,
) -> Response {
    match state.snapshots.save(&room, body).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// GET /rooms/{room}/snapshot — fetch the latest document blob.
async fn load_snapshot_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Response {
    match state.snapshots.load(&room).await {
        Ok(Some(blob)) => blob.into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "no snapshot for room"),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn exec_error_response(e: &ExecError) -> Response {
    let status = match e {
        ExecError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        ExecError::ServiceUnavailable(_) | ExecError::ServiceError(_) => StatusCode::BAD_GATEWAY,
    };
    error_body(status, &e.to_string())
}

fn error_body(status: StatusCode, message: &str) -> Response {
    let body: Value = json!({ "error": message });
    (status, Json(body)).into_response()
}
