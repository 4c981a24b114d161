//! Test fixtures for integration tests
//!
//! Upstream TCP peers and payload generators.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Default bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP upstream whose connections are handed to the test one at a time
pub struct TestUpstream {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl TestUpstream {
    /// Bind on an ephemeral loopback port
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// Address string for the relay configuration
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Accept the next relay connection
    pub async fn accept(&self) -> Result<TcpStream> {
        let (stream, _) = tokio::time::timeout(TEST_TIMEOUT, self.listener.accept())
            .await
            .context("Timed out waiting for the relay to dial")??;
        Ok(stream)
    }
}

/// An upstream that echoes every connection back to itself
pub struct EchoUpstream {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl EchoUpstream {
    /// Start echoing on an ephemeral loopback port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.split();
                    tokio::io::copy(&mut reader, &mut writer).await.ok();
                });
            }
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

/// An address nothing listens on
pub async fn unreachable_addr() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}

/// Deterministic, non-repeating-at-chunk-boundaries payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Read exactly `len` bytes from an upstream connection
pub async fn read_exact_upstream(stream: &mut TcpStream, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .context("Timed out reading from the relay")??;
    Ok(buf)
}

/// Read until the relay closes the upstream connection
pub async fn read_to_eof(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    tokio::time::timeout(TEST_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .context("Timed out waiting for the relay to close the upstream")??;
    Ok(buf)
}
