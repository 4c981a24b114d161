//! Unidirectional forwarders
//!
//! Each session runs one forwarder per direction. A forwarder owns the read
//! side of one transport and the write side of the other, so the data path
//! needs no locking. Every suspension point races the session's
//! cancellation token, which is how the surviving direction is stopped once
//! its sibling has finished. The idle timeout is measured against an
//! [`Activity`] clock shared by both directions of a session.

use super::error::{BoxError, ForwardError};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Direction of travel through the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// TCP upstream to WebSocket client
    UpstreamToClient,
    /// WebSocket client to TCP upstream
    ClientToUpstream,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpstreamToClient => f.write_str("upstream->client"),
            Self::ClientToUpstream => f.write_str("client->upstream"),
        }
    }
}

/// Why a forwarder stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The upstream returned end-of-stream
    UpstreamClosed,
    /// The client sent a close frame or its stream ended
    ClientClosed,
    /// The session's cancellation token fired
    Cancelled,
}

/// Traffic counters for one direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrafficStats {
    /// Payload bytes forwarded
    pub bytes: u64,
    /// Chunks or messages forwarded
    pub messages: u64,
    /// Non-binary client frames dropped
    pub discarded: u64,
}

impl TrafficStats {
    fn record(&mut self, len: usize) {
        self.bytes += len as u64;
        self.messages += 1;
    }
}

/// Tunables shared by both directions
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Upper bound on a single upstream read, and so on a binary message
    pub chunk_size: usize,
    /// Bound on the wait for the next read or receive
    pub idle_timeout: Option<Duration>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            idle_timeout: None,
        }
    }
}

/// Last time either direction of a session moved data
///
/// Clones share the same clock.
#[derive(Debug, Clone)]
pub struct Activity {
    origin: Instant,
    last_millis: Arc<AtomicU64>,
}

impl Activity {
    /// Start a clock that counts as active right now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record that data just moved
    pub fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_millis.fetch_max(now, Ordering::Relaxed);
    }

    /// Time since either direction last moved data
    pub fn idle_for(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_millis.load(Ordering::Relaxed)))
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `fut` until the whole session has been idle for `idle_timeout`
///
/// Progress in the other direction pushes the deadline back, so a quiet
/// direction is only timed out once both are quiet.
async fn within_idle<F: Future>(
    idle_timeout: Option<Duration>,
    activity: &Activity,
    fut: F,
) -> Result<F::Output, ForwardError> {
    let Some(limit) = idle_timeout else {
        return Ok(fut.await);
    };

    tokio::pin!(fut);
    loop {
        let remaining = limit.saturating_sub(activity.idle_for());
        if remaining.is_zero() {
            return Err(ForwardError::IdleTimeout(limit));
        }

        tokio::select! {
            output = &mut fut => return Ok(output),
            () = tokio::time::sleep(remaining) => {}
        }
    }
}

/// Copy upstream bytes to the client, one binary message per read
///
/// The next read is only issued once the previous message has been accepted
/// by the sink, so a slow client throttles the upstream instead of growing a
/// buffer.
pub async fn upstream_to_client<R, S>(
    reader: &mut R,
    sink: &mut S,
    options: &ForwardOptions,
    activity: &Activity,
    cancel: &CancellationToken,
    stats: &mut TrafficStats,
) -> Result<StreamEnd, ForwardError>
where
    R: AsyncRead + Unpin,
    S: Sink<Message> + Unpin,
    S::Error: Into<BoxError>,
{
    let mut buf = vec![0u8; options.chunk_size];

    loop {
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            read = within_idle(options.idle_timeout, activity, reader.read(&mut buf)) => {
                read?.map_err(ForwardError::UpstreamRead)?
            }
        };

        if n == 0 {
            return Ok(StreamEnd::UpstreamClosed);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            sent = sink.send(Message::Binary(buf[..n].to_vec())) => {
                sent.map_err(|e| ForwardError::ClientSend(e.into()))?;
            }
        }

        stats.record(n);
        activity.touch();
        tracing::trace!(bytes = n, "Forwarded upstream chunk");
    }
}

/// Copy binary client messages to the upstream
///
/// Each payload is written and flushed before the next message is received.
/// Text, ping and pong frames carry nothing for the upstream and are dropped.
pub async fn client_to_upstream<St, E, W>(
    stream: &mut St,
    writer: &mut W,
    options: &ForwardOptions,
    activity: &Activity,
    cancel: &CancellationToken,
    stats: &mut TrafficStats,
) -> Result<StreamEnd, ForwardError>
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Into<BoxError>,
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            next = within_idle(options.idle_timeout, activity, stream.next()) => next?,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(ForwardError::ClientReceive(e.into())),
            None => return Ok(StreamEnd::ClientClosed),
        };

        match message {
            Message::Binary(data) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                    written = write_and_flush(writer, &data) => {
                        written.map_err(ForwardError::UpstreamWrite)?;
                    }
                }

                stats.record(data.len());
                activity.touch();
                tracing::trace!(bytes = data.len(), "Forwarded client message");
            }
            Message::Close(frame) => {
                tracing::debug!(
                    code = frame.as_ref().map(|f| f.code),
                    "Client sent close frame"
                );
                return Ok(StreamEnd::ClientClosed);
            }
            Message::Text(_) | Message::Ping(_) | Message::Pong(_) => {
                stats.discarded += 1;
                tracing::trace!("Discarded non-binary client frame");
            }
        }
    }
}

async fn write_and_flush<W>(writer: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}
