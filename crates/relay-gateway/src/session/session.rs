//! Session lifecycle
//!
//! A session pairs one accepted WebSocket with one freshly dialed TCP
//! connection, runs both forwarders, and tears both transports down together.

use super::error::{BoxError, ForwardError, SessionError};
use super::forwarder::{self, Activity, Direction, ForwardOptions, StreamEnd, TrafficStats};
use super::registry::{SessionInfo, SessionRegistry};
use crate::protocol::CloseCode;
use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use relay_common::UpstreamConfig;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The upstream could not be dialed; the client was closed straight away
    DialFailed(SessionError),
    /// Both directions ran and have stopped
    Completed(SessionReport),
}

impl SessionOutcome {
    /// Close code the client was sent
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::DialFailed(e) => e.close_code(),
            Self::Completed(report) => report.close_code,
        }
    }
}

/// Summary of a completed session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Direction that stopped first and triggered teardown
    pub ended_by: Direction,
    /// Close code sent to the client
    pub close_code: CloseCode,
    pub upstream_to_client: TrafficStats,
    pub client_to_upstream: TrafficStats,
    /// Time from upstream connect to teardown
    pub duration: Duration,
}

/// One client paired with one upstream connection
#[derive(Debug)]
pub struct Session {
    id: String,
    peer: SocketAddr,
    upstream: UpstreamConfig,
    options: ForwardOptions,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

impl Session {
    /// Create a session for a freshly accepted client
    ///
    /// `shutdown` is the relay-wide token; cancelling it ends the session
    /// with `GoingAway`.
    pub fn new(
        peer: SocketAddr,
        upstream: UpstreamConfig,
        options: ForwardOptions,
        registry: Arc<SessionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            peer,
            upstream,
            options,
            registry,
            shutdown,
        }
    }

    /// Generate a new session ID
    #[must_use]
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Get the session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the client address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Dial the upstream, relay until either side stops, then close both
    ///
    /// Returns only after both forwarders have stopped and both transports
    /// have been closed.
    pub async fn start<F, E>(self, framed: F) -> SessionOutcome
    where
        F: Stream<Item = Result<Message, E>> + Sink<Message> + Send + 'static,
        <F as Sink<Message>>::Error: Into<BoxError> + Send,
        E: Into<BoxError> + Send + 'static,
    {
        let (mut sink, stream) = framed.split();

        let tcp = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(SessionError::Cancelled),
            dialed = dial(&self.upstream) => dialed,
        };

        let tcp = match tcp {
            Ok(tcp) => tcp,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    peer = %self.peer,
                    error = %e,
                    "Upstream dial failed, closing client"
                );
                close_client(&mut sink, e.close_code()).await;
                return SessionOutcome::DialFailed(e);
            }
        };

        let _guard = self.registry.register(
            &self.id,
            SessionInfo::new(self.peer, self.upstream.address.clone()),
        );

        tracing::info!(
            session_id = %self.id,
            peer = %self.peer,
            upstream = %self.upstream.address,
            "Session established"
        );

        let (mut tcp_read, mut tcp_write) = tcp.into_split();
        let pair = self.shutdown.child_token();
        let activity = Activity::new();
        let span = tracing::debug_span!("session", session_id = %self.id);

        let mut upstream_task = {
            let options = self.options.clone();
            let activity = activity.clone();
            let cancel = pair.clone();
            tokio::spawn(
                async move {
                    let mut stats = TrafficStats::default();
                    let result = forwarder::upstream_to_client(
                        &mut tcp_read,
                        &mut sink,
                        &options,
                        &activity,
                        &cancel,
                        &mut stats,
                    )
                    .await;
                    (sink, stats, result)
                }
                .instrument(span.clone()),
            )
        };

        let mut client_task = {
            let options = self.options.clone();
            let activity = activity.clone();
            let cancel = pair.clone();
            let mut stream = stream;
            tokio::spawn(
                async move {
                    let mut stats = TrafficStats::default();
                    let result = forwarder::client_to_upstream(
                        &mut stream,
                        &mut tcp_write,
                        &options,
                        &activity,
                        &cancel,
                        &mut stats,
                    )
                    .await;
                    (tcp_write, stats, result)
                }
                .instrument(span),
            )
        };

        // First direction to stop cancels the other; both are always joined.
        let (ended_by, upstream_done, client_done) = tokio::select! {
            done = &mut upstream_task => {
                pair.cancel();
                (Direction::UpstreamToClient, done, client_task.await)
            }
            done = &mut client_task => {
                pair.cancel();
                (Direction::ClientToUpstream, upstream_task.await, done)
            }
        };

        let close_code = match ended_by {
            Direction::UpstreamToClient => {
                termination_close_code(upstream_done.as_ref().map(|(_, _, r)| r))
            }
            Direction::ClientToUpstream => {
                termination_close_code(client_done.as_ref().map(|(_, _, r)| r))
            }
        };

        let upstream_to_client = self.finish_direction(
            Direction::UpstreamToClient,
            upstream_done.as_ref().map(|(_, stats, result)| (*stats, result)),
        );
        let client_to_upstream = self.finish_direction(
            Direction::ClientToUpstream,
            client_done.as_ref().map(|(_, stats, result)| (*stats, result)),
        );

        // Close each transport once; a panicked task already dropped its half.
        if let Ok((mut sink, _, _)) = upstream_done {
            close_client(&mut sink, close_code).await;
        }
        if let Ok((mut tcp_write, _, _)) = client_done {
            if let Err(e) = tcp_write.shutdown().await {
                tracing::debug!(session_id = %self.id, error = %e, "Upstream already closed");
            }
        }

        let report = SessionReport {
            ended_by,
            close_code,
            upstream_to_client,
            client_to_upstream,
            duration: self
                .registry
                .get(&self.id)
                .map_or(Duration::ZERO, |info| info.age()),
        };

        tracing::info!(
            session_id = %self.id,
            peer = %self.peer,
            ended_by = %report.ended_by,
            close_code = report.close_code.as_u16(),
            upstream_bytes = report.upstream_to_client.bytes,
            upstream_messages = report.upstream_to_client.messages,
            client_bytes = report.client_to_upstream.bytes,
            client_messages = report.client_to_upstream.messages,
            discarded_frames = report.client_to_upstream.discarded,
            duration_ms = report.duration.as_millis() as u64,
            "Session closed"
        );

        SessionOutcome::Completed(report)
    }

    /// Log how one direction stopped and return its counters
    fn finish_direction(
        &self,
        direction: Direction,
        done: Result<(TrafficStats, &Result<StreamEnd, ForwardError>), &JoinError>,
    ) -> TrafficStats {
        match done {
            Ok((stats, Ok(end))) => {
                tracing::debug!(
                    session_id = %self.id,
                    direction = %direction,
                    end = ?end,
                    "Forwarder stopped"
                );
                stats
            }
            Ok((stats, Err(e))) => {
                tracing::debug!(
                    session_id = %self.id,
                    direction = %direction,
                    error = %e,
                    "Forwarder failed"
                );
                stats
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.id,
                    direction = %direction,
                    error = %e,
                    "Forwarder task panicked"
                );
                TrafficStats::default()
            }
        }
    }
}

/// Connect to the upstream, honoring the optional connect timeout
pub async fn dial(upstream: &UpstreamConfig) -> Result<TcpStream, SessionError> {
    let connect = TcpStream::connect(upstream.address.as_str());

    let connected = match upstream.connect_timeout() {
        Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
            SessionError::DialTimeout {
                addr: upstream.address.clone(),
                timeout: limit,
            }
        })?,
        None => connect.await,
    };

    connected.map_err(|source| SessionError::Dial {
        addr: upstream.address.clone(),
        source,
    })
}

fn termination_close_code(done: Result<&Result<StreamEnd, ForwardError>, &JoinError>) -> CloseCode {
    match done {
        Ok(Ok(StreamEnd::UpstreamClosed | StreamEnd::ClientClosed)) => CloseCode::Normal,
        Ok(Ok(StreamEnd::Cancelled)) => CloseCode::GoingAway,
        Ok(Err(e)) => e.close_code(),
        Err(_) => CloseCode::InternalError,
    }
}

/// Send a close frame and close the client sink
///
/// Errors are expected here when the client already went away and are only
/// logged at debug.
pub(crate) async fn close_client<S>(sink: &mut S, code: CloseCode)
where
    S: Sink<Message> + Unpin,
    S::Error: Into<BoxError>,
{
    let frame = CloseFrame {
        code: code.as_u16(),
        reason: Cow::Borrowed(code.description()),
    };

    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        let e: BoxError = e.into();
        tracing::debug!(error = %e, "Client already closed");
    }
    if let Err(e) = sink.close().await {
        let e: BoxError = e.into();
        tracing::debug!(error = %e, "Client close failed");
    }
}
