//! Relay Integration Tests
//!
//! Every test runs a relay on an ephemeral loopback port in front of a local
//! TCP upstream, so nothing external is required.
//!
//! Run with: cargo test -p integration-tests --test relay_tests

use futures_util::SinkExt;
use integration_tests::*;
use relay_common::{RelayError, SessionConfig};
use tokio::io::AsyncWriteExt;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let relay = TestRelay::start(unreachable_addr().await.unwrap()).await.unwrap();

    let response = reqwest::get(format!("{}/health", relay.base_url()))
        .await
        .expect("Request failed");
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

// ============================================================================
// Upstream -> Client Tests
// ============================================================================

#[tokio::test]
async fn test_upstream_bytes_reach_client_then_close() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    peer.write_all(b"\x01\x02\x03").await.unwrap();
    drop(peer);

    let received = read_until_close(&mut client).await.unwrap();
    assert_eq!(received.bytes, b"\x01\x02\x03");
    assert_eq!(received.close_code, Some(1000));

    relay.wait_for_sessions(0).await.unwrap();
}

#[tokio::test]
async fn test_large_upstream_payload_is_byte_exact() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start_with(
        upstream.address(),
        SessionConfig {
            chunk_size: 1024,
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    let payload = pattern(256 * 1024);
    let writer = tokio::spawn(async move {
        peer.write_all(&payload).await.unwrap();
        payload
    });

    let received = read_until_close(&mut client).await.unwrap();
    let payload = writer.await.unwrap();

    assert_eq!(received.bytes.len(), payload.len());
    assert_eq!(received.bytes, payload);
    assert!(received.message_sizes.iter().all(|&n| n > 0 && n <= 1024));
    assert_eq!(received.close_code, Some(1000));
}

// ============================================================================
// Client -> Upstream Tests
// ============================================================================

#[tokio::test]
async fn test_client_messages_reach_upstream_in_order() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    let mut expected = Vec::new();
    for i in 0u16..100 {
        let message = i.to_be_bytes().repeat(8);
        expected.extend_from_slice(&message);
        client.send(Message::Binary(message)).await.unwrap();
    }

    let received = read_exact_upstream(&mut peer, expected.len()).await.unwrap();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_text_frames_are_discarded() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    client.send(Message::Text("not for upstream".to_string())).await.unwrap();
    client.send(Message::Binary(vec![1, 2])).await.unwrap();
    client.send(Message::Ping(vec![42])).await.unwrap();
    client.send(Message::Text("still not".to_string())).await.unwrap();
    client.send(Message::Binary(vec![3])).await.unwrap();

    // Session is still relaying in both directions afterwards
    peer.write_all(b"ack").await.unwrap();
    assert_eq!(read_binary(&mut client, 3).await.unwrap(), b"ack");

    client.close(None).await.unwrap();
    let everything = read_to_eof(&mut peer).await.unwrap();
    assert_eq!(everything, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_client_close_closes_upstream() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    client.send(Message::Binary(b"last".to_vec())).await.unwrap();
    client.close(None).await.unwrap();

    let rest = read_to_eof(&mut peer).await.unwrap();
    assert_eq!(rest, b"last");
    relay.wait_for_sessions(0).await.unwrap();
}

#[tokio::test]
async fn test_client_drop_closes_upstream() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    // No close handshake, just the TCP connection going away
    drop(client);

    let rest = read_to_eof(&mut peer).await.unwrap();
    assert!(rest.is_empty());
    relay.wait_for_sessions(0).await.unwrap();
}

// ============================================================================
// Echo / Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_round_trip_through_echo_upstream() {
    let upstream = EchoUpstream::start().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let payload = pattern(10_000);
    for chunk in payload.chunks(777) {
        client.send(Message::Binary(chunk.to_vec())).await.unwrap();
    }

    let echoed = read_binary(&mut client, payload.len()).await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_are_isolated() {
    let upstream = EchoUpstream::start().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut tasks = Vec::new();
    for id in 1u8..=8 {
        let url = relay.ws_url();
        tasks.push(tokio::spawn(async move {
            let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            for _ in 0..20 {
                client.send(Message::Binary(vec![id; 500])).await.unwrap();
            }
            let echoed = read_binary(&mut client, 20 * 500).await.unwrap();
            client.close(None).await.ok();
            (id, echoed)
        }));
    }

    for task in tasks {
        let (id, echoed) = task.await.unwrap();
        assert_eq!(echoed.len(), 20 * 500);
        assert!(
            echoed.iter().all(|&b| b == id),
            "session {id} received another session's bytes"
        );
    }

    relay.wait_for_sessions(0).await.unwrap();
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_unreachable_upstream_closes_client() {
    let relay = TestRelay::start(unreachable_addr().await.unwrap()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let received = read_until_close(&mut client).await.unwrap();

    assert!(received.bytes.is_empty());
    assert_eq!(received.close_code, Some(4014));
    assert_eq!(relay.active_sessions(), 0);
}

#[tokio::test]
async fn test_dial_failure_does_not_affect_live_session() {
    let upstream = TestUpstream::bind().await.unwrap();
    let address = upstream.address();
    let relay = TestRelay::start(address).await.unwrap();

    let mut first = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    // Upstream stops listening; later dials are refused
    drop(upstream);

    let mut second = relay.connect().await.unwrap();
    let rejected = read_until_close(&mut second).await.unwrap();
    assert_eq!(rejected.close_code, Some(4014));

    // The first session keeps relaying both ways
    peer.write_all(b"still here").await.unwrap();
    assert_eq!(read_binary(&mut first, 10).await.unwrap(), b"still here");

    first.send(Message::Binary(b"me too".to_vec())).await.unwrap();
    assert_eq!(read_exact_upstream(&mut peer, 6).await.unwrap(), b"me too");

    assert_eq!(relay.active_sessions(), 1);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = TestUpstream::bind().await.unwrap();

    let err = relay_gateway::bind(&taken.address()).await.unwrap_err();
    assert!(matches!(err, RelayError::Bind { .. }));
    assert_eq!(err.error_code(), "BIND_FAILED");
}

// ============================================================================
// Admission / Timeout / Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_session_limit_rejects_extra_clients() {
    let upstream = EchoUpstream::start().await.unwrap();
    let relay = TestRelay::start_with(
        upstream.address(),
        SessionConfig {
            max_sessions: Some(1),
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    let mut first = relay.connect().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    let mut second = relay.connect().await.unwrap();
    let rejected = read_until_close(&mut second).await.unwrap();
    assert_eq!(rejected.close_code, Some(1013));

    first.close(None).await.unwrap();
    read_until_close(&mut first).await.unwrap();
    relay.wait_for_sessions(0).await.unwrap();

    let mut third = relay.connect().await.unwrap();
    third.send(Message::Binary(b"ok".to_vec())).await.unwrap();
    assert_eq!(read_binary(&mut third, 2).await.unwrap(), b"ok");
}

#[tokio::test]
async fn test_idle_timeout_closes_session() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start_with(
        upstream.address(),
        SessionConfig {
            idle_timeout_secs: Some(1),
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    let received = read_until_close(&mut client).await.unwrap();
    assert_eq!(received.close_code, Some(4008));

    let rest = read_to_eof(&mut peer).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_idle_timeout_spares_receive_only_client() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start_with(
        upstream.address(),
        SessionConfig {
            idle_timeout_secs: Some(1),
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();

    // Upstream keeps streaming past the timeout; the client only listens.
    let feeder = tokio::spawn(async move {
        for i in 0u8..8 {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            peer.write_all(&[i]).await.unwrap();
        }
    });

    let received = read_until_close(&mut client).await.unwrap();
    feeder.await.unwrap();

    assert_eq!(received.bytes, (0u8..8).collect::<Vec<_>>());
    assert_eq!(received.close_code, Some(1000));
}

#[tokio::test]
async fn test_shutdown_closes_sessions_with_going_away() {
    let upstream = TestUpstream::bind().await.unwrap();
    let relay = TestRelay::start(upstream.address()).await.unwrap();

    let mut client = relay.connect().await.unwrap();
    let mut peer = upstream.accept().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    let registry = relay.state.registry().clone();
    relay.shutdown().await.unwrap();

    let received = read_until_close(&mut client).await.unwrap();
    assert_eq!(received.close_code, Some(1001));

    let rest = read_to_eof(&mut peer).await.unwrap();
    assert!(rest.is_empty());
    assert_eq!(registry.active_count(), 0);
}
