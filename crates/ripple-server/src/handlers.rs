//! HTTP and WebSocket handlers for the Ripple server.
//!
//! A page request creates a pending session and renders the demo into it.
//! The page's script then connects to `{websocket_path}/{key}`, which claims
//! the session and serves it until either side goes away.

use crate::config::Config;
use crate::demo::Demo;
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use ripple_core::{Engine, Message, Session, SessionError, SessionKey};
use ripple_protocol::{Command, Version, PROTOCOL_VERSION};
use ripple_transport::websocket;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace, warn};

const CLIENT_SCRIPT: &str = include_str!("../static/ripple.js");

/// Shared server state.
pub struct AppState {
    /// The session engine.
    pub engine: Arc<Engine>,
    /// Server configuration.
    pub config: Config,
    /// State behind the demo page.
    pub demo: Demo,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            engine: Arc::new(Engine::new(config.engine_config())),
            config,
            demo: Demo::new(),
        }
    }
}

/// Query parameters of the WebSocket request.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    /// Protocol version the client speaks.
    v: Option<String>,
}

/// Build the router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_route = format!(
        "{}/:key",
        state.config.transport.websocket_path.trim_end_matches('/')
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/ripple.js", get(script_handler))
        .route(&ws_route, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Ripple server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}/{{key}}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config));
    let engine = state.engine.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        engine.shutdown();
    });

    serve(listener, state).await
}

/// Serve on `listener` until the engine shuts down.
///
/// Starts the heartbeat and pruning tasks, which stop with the engine.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let engine = state.engine.clone();
    spawn_heartbeat(
        engine.clone(),
        Duration::from_millis(state.config.heartbeat.interval_ms),
    );
    spawn_pruner(
        engine.clone(),
        Duration::from_millis(state.config.session.prune_interval_ms),
        state.config.max_pending_age(),
    );

    let shutdown = engine.shutdown_token();
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Publish a `Ping` to every session on a fixed interval.
fn spawn_heartbeat(engine: Arc<Engine>, period: Duration) {
    if period.is_zero() {
        return;
    }
    let shutdown = engine.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let n = engine.broadcast(Message::session(Command::Ping, ""));
                    trace!(sessions = n, "Heartbeat");
                }
            }
        }
    });
}

/// Expire sessions whose page never connected.
fn spawn_pruner(engine: Arc<Engine>, period: Duration, max_age: Duration) {
    if period.is_zero() {
        return;
    }
    let shutdown = engine.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    engine.prune_stale(max_age);
                    metrics::set_pending_sessions(engine.pending_count());
                }
            }
        }
    });
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.engine.is_shutdown() { "stopping" } else { "ok" };
    axum::Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION.to_string(),
        "pending": state.engine.pending_count(),
        "sessions": state.engine.hub().subscriber_count(),
    }))
}

/// Serve the browser client.
async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}

/// Render the demo page into a new session.
async fn index_handler(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let session = match state.engine.new_session(Some(addr.ip())) {
        Ok(session) => session,
        Err(e) => {
            warn!(remote = %addr, error = %e, "Refusing page request");
            metrics::record_error("new_session");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };
    metrics::set_pending_sessions(state.engine.pending_count());

    match state
        .demo
        .render(&session, &state.config.transport.websocket_path)
    {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!(session = %session.key(), error = %e, "Rendering failed");
            metrics::record_error("render");
            session.close();
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(key): Path<String>,
    Query(params): Query<ConnectParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Some(v) = params.v.as_deref() {
        let compatible = Version::parse(v).is_some_and(|v| v.is_compatible_with(&PROTOCOL_VERSION));
        if !compatible {
            debug!(remote = %addr, version = v, "Unsupported protocol version");
            return (
                StatusCode::BAD_REQUEST,
                format!("unsupported protocol version {v:?}, server speaks {PROTOCOL_VERSION}"),
            )
                .into_response();
        }
    }

    let Some(key) = SessionKey::parse(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let session = match state.engine.claim(key, Some(addr.ip())) {
        Ok(session) => session,
        Err(SessionError::AddressMismatch { .. }) => {
            metrics::record_error("address_mismatch");
            return StatusCode::FORBIDDEN.into_response();
        }
        Err(e) => {
            debug!(session = %key, remote = %addr, error = %e, "Rejecting connect");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    metrics::set_pending_sessions(state.engine.pending_count());

    ws.max_message_size(state.config.limits.max_frame_size)
        .on_upgrade(move |socket| handle_session(socket, session, addr))
}

/// Serve a claimed session over an upgraded socket.
async fn handle_session(socket: WebSocket, session: Session, addr: SocketAddr) {
    let _metrics_guard = SessionMetricsGuard::new();
    let started = Instant::now();

    debug!(session = %session.key(), remote = %addr, "WebSocket connected");

    let (reader, writer) = websocket::split(socket, Some(addr));
    match session.serve(reader, writer).await {
        Ok(report) => {
            debug!(
                session = %report.key,
                exit = %report.exit,
                frames_in = report.received.frames,
                frames_out = report.sent.frames,
                "WebSocket disconnected"
            );
            metrics::record_report(&report, started.elapsed());
        }
        Err(e) => {
            warn!(session = %session.key(), error = %e, "Session ended before serving");
            metrics::record_error("serve");
        }
    }
}
