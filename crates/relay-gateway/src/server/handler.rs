//! WebSocket handler
//!
//! Upgrades the request and hands the socket to a new session.

use crate::protocol::CloseCode;
use crate::server::state::Admission;
use crate::server::RelayState;
use crate::session::close_client;
use axum::{
    extract::{ws::WebSocket, ConnectInfo, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::StreamExt;
use std::net::SocketAddr;

/// WebSocket relay handler
pub async fn relay_handler(
    State(state): State<RelayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let permit = match state.admit() {
        Admission::Unlimited => None,
        Admission::Admitted(permit) => Some(permit),
        Admission::Full => {
            tracing::warn!(
                peer = %peer,
                limit = ?state.config().session.max_sessions,
                "Session limit reached, rejecting client"
            );
            return ws.on_upgrade(move |socket| reject(socket, CloseCode::TryAgainLater));
        }
    };

    if state.shutdown_token().is_cancelled() {
        return ws.on_upgrade(move |socket| reject(socket, CloseCode::GoingAway));
    }

    let session = state.new_session(peer);
    let tracker = state.tracker().clone();

    tracing::debug!(session_id = %session.id(), peer = %peer, "WebSocket upgrade accepted");

    ws.on_upgrade(move |socket| {
        tracker.track_future(async move {
            // Slot is held until the session has fully torn down.
            let _permit = permit;
            session.start(socket).await;
        })
    })
}

/// Close an upgraded socket without starting a session
async fn reject(socket: WebSocket, code: CloseCode) {
    let (mut sink, _stream) = socket.split();
    close_client(&mut sink, code).await;
}
