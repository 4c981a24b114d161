//! Relay server setup
//!
//! Binds the listener, serves the WebSocket route, and coordinates shutdown.

mod handler;
mod state;

pub use handler::relay_handler;
pub use state::{Admission, RelayState};

use axum::{routing::get, Router};
use relay_common::{RelayConfig, RelayError, RelayResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// How long shutdown waits for sessions to send their close frames
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the relay router
pub fn create_router(path: &str) -> Router<RelayState> {
    Router::new()
        .route(path, get(relay_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: RelayState) -> Router {
    create_router(&state.config().listen.path)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listening socket
///
/// Failure here is fatal for the process and is not retried.
pub async fn bind(addr: &str) -> RelayResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::bind(addr, e))
}

/// Serve until the state's shutdown token fires, then drain sessions
pub async fn run_server(listener: TcpListener, state: RelayState) -> RelayResult<()> {
    let app = create_app(state.clone());
    let shutdown = state.shutdown_token().clone();

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(RelayError::Serve);

    // Sessions outlive the accept loop; stop them too.
    state.shutdown_token().cancel();
    drain_sessions(&state).await;

    served
}

async fn drain_sessions(state: &RelayState) {
    let tracker = state.tracker();
    tracker.close();

    tracing::info!(
        active_sessions = state.registry().active_count(),
        "Waiting for sessions to close"
    );

    if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            active_sessions = state.registry().active_count(),
            "Sessions still open after {:?}",
            SESSION_DRAIN_TIMEOUT
        );
    }
}

/// Cancel `token` on Ctrl-C, and on SIGTERM where available
pub fn spawn_signal_handlers(token: CancellationToken) {
    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            on_ctrl_c.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sig) = signal(SignalKind::terminate()) {
            sig.recv().await;
            tracing::info!("SIGTERM received, shutting down");
            token.cancel();
        }
    });
}

/// Run the complete relay server with configuration
pub async fn run(config: RelayConfig) -> RelayResult<()> {
    let addr = config.listen.address();
    let listener = bind(&addr).await?;

    let state = RelayState::new(config);
    spawn_signal_handlers(state.shutdown_token().clone());

    tracing::info!(
        upstream = %state.config().upstream.address,
        "Relay listening on ws://{}{}",
        addr,
        state.config().listen.path
    );

    run_server(listener, state).await
}
