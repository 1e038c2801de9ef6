//! End-to-end tests: shard fleet against the scripted mock gateway

use std::time::{Duration, Instant};

use integration_tests::*;
use pylon_core::Snowflake;
use pylon_gateway::GatewayEvent;
use serde_json::json;

/// Heartbeat interval long enough to stay out of the way
const QUIET_INTERVAL: u64 = 60_000;

#[tokio::test]
async fn test_identify_handshake_and_ready() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 1, 100);
    let mut events = client.start().await.unwrap();

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;

    // Fresh session: the shard must identify, never resume
    let identify = expect_op(&mut socket, 2).await;
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    assert!(identify["d"]["large_threshold"].is_number());

    send_json(&mut socket, dispatch("READY", 1, ready_body("abc", &[]))).await;

    let ready = next_dispatch(&mut events).await;
    assert_eq!(ready.kind, "READY");
    assert_eq!(ready.shard_id, 0);

    // Session persisted for later resumes
    let session = client.sessions.get(0).unwrap();
    assert_eq!(session.session_id, "abc");
    assert_eq!(session.sequence, 1);

    // Current user cached before READY was published
    assert_eq!(
        client.cache.current_user().unwrap().id,
        Snowflake::new(900)
    );

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_fleet_identify_spacing() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 2, 400);
    let _events = client.start().await.unwrap();

    // Shard 0 handshake
    let mut socket0 = gateway.next_connection().await;
    send_json(&mut socket0, hello(QUIET_INTERVAL)).await;
    expect_op(&mut socket0, 2).await;
    let first_identify = Instant::now();
    send_json(&mut socket0, dispatch("READY", 1, ready_body("s0", &[]))).await;

    // Shard 1 may not even connect before shard 0's deferred READY reply
    // releases the queue, which waits out the identify delay
    let mut socket1 = gateway.next_connection().await;
    send_json(&mut socket1, hello(QUIET_INTERVAL)).await;
    let identify1 = expect_op(&mut socket1, 2).await;
    let elapsed = first_identify.elapsed();

    assert_eq!(identify1["d"]["shard"], json!([1, 2]));
    assert!(
        elapsed >= Duration::from_millis(350),
        "consecutive identifies only {}ms apart",
        elapsed.as_millis()
    );

    send_json(&mut socket1, dispatch("READY", 1, ready_body("s1", &[]))).await;
    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_resume_after_socket_drop() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 1, 100);
    let mut events = client.start().await.unwrap();

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;
    expect_op(&mut socket, 2).await;
    send_json(&mut socket, dispatch("READY", 1, ready_body("abc", &[]))).await;
    assert_eq!(next_dispatch(&mut events).await.kind, "READY");

    // Bump the stored sequence past READY's
    send_json(
        &mut socket,
        dispatch("MESSAGE_CREATE", 7, json!({"id": "1", "content": "hi"})),
    )
    .await;
    assert_eq!(next_dispatch(&mut events).await.kind, "MESSAGE_CREATE");

    // Drop the connection; the shard re-queues itself
    drop(socket);

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;

    // Stored session: RESUME with the stored id and sequence, not IDENTIFY
    let resume = expect_op(&mut socket, 6).await;
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 7);

    send_json(&mut socket, dispatch("RESUMED", 8, json!({}))).await;
    assert_eq!(next_dispatch(&mut events).await.kind, "RESUMED");

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_invalid_session_forces_identify() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 1, 100);
    let mut events = client.start().await.unwrap();

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;
    expect_op(&mut socket, 2).await;
    send_json(&mut socket, dispatch("READY", 1, ready_body("abc", &[]))).await;
    assert_eq!(next_dispatch(&mut events).await.kind, "READY");

    // Non-resumable invalid session wipes the stored state
    send_json(&mut socket, invalid_session(false)).await;

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;

    // The next handshake must IDENTIFY, never RESUME
    let identify = expect_op(&mut socket, 2).await;
    assert_eq!(identify["d"]["shard"], json!([0, 1]));

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_zombie_connection_closes_and_requeues_once() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 1, 50);
    let mut events = client.start().await.unwrap();

    let mut socket = gateway.next_connection().await;
    // Short interval so the unacked beat is detected quickly
    send_json(&mut socket, hello(150)).await;
    let identify = recv_json(&mut socket).await;
    assert_eq!(identify["op"], 2);
    send_json(&mut socket, dispatch("READY", 1, ready_body("abc", &[]))).await;
    assert_eq!(next_dispatch(&mut events).await.kind, "READY");

    // Never ACK: the shard must close on the tick after its first beat
    let mut saw_heartbeat = false;
    loop {
        match futures_util::StreamExt::next(&mut socket).await {
            Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                if frame["op"] == 1 {
                    saw_heartbeat = true;
                }
            }
            _ => break,
        }
    }
    assert!(saw_heartbeat, "shard never sent a heartbeat");

    // The zombie episode re-queues the shard exactly once: one new
    // connection, resuming the stored session
    let mut socket = tokio::time::timeout(Duration::from_secs(5), gateway.next_connection())
        .await
        .expect("zombie shard never reconnected");
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;
    expect_op(&mut socket, 6).await;
    send_json(&mut socket, dispatch("RESUMED", 2, json!({}))).await;

    // And only once: no further connection attempts follow
    assert!(
        tokio::time::timeout(Duration::from_millis(400), gateway.next_connection())
            .await
            .is_err(),
        "shard was re-queued more than once for one zombie episode"
    );

    client.manager.shutdown().await;
}

#[tokio::test]
async fn test_large_guild_chunks_gate_subscribers() {
    let mut gateway = MockGateway::spawn().await.unwrap();
    let mut client = TestClient::build(&gateway.url, 1, 100);
    let mut events = client.start().await.unwrap();

    let mut socket = gateway.next_connection().await;
    send_json(&mut socket, hello(QUIET_INTERVAL)).await;
    expect_op(&mut socket, 2).await;
    send_json(&mut socket, dispatch("READY", 1, ready_body("abc", &[42]))).await;
    assert_eq!(next_dispatch(&mut events).await.kind, "READY");

    // 2500 members -> three chunks expected
    send_json(
        &mut socket,
        dispatch("GUILD_CREATE", 2, guild_create_body(42, 2500)),
    )
    .await;

    let request = expect_op(&mut socket, 8).await;
    assert_eq!(request["d"]["guild_id"], "42");

    // An event for the loading guild arrives before its chunks
    send_json(
        &mut socket,
        dispatch("MESSAGE_CREATE", 3, json!({"id": "1", "guild_id": "42"})),
    )
    .await;

    send_json(&mut socket, dispatch("GUILD_MEMBERS_CHUNK", 4, chunk_body(42, 1000, 1000))).await;
    send_json(&mut socket, dispatch("GUILD_MEMBERS_CHUNK", 5, chunk_body(42, 2000, 1000))).await;
    send_json(&mut socket, dispatch("GUILD_MEMBERS_CHUNK", 6, chunk_body(42, 3000, 500))).await;

    // Snapshot first, then the buffered event, then the fleet-wide signal
    let create = next_dispatch(&mut events).await;
    assert_eq!(create.kind, "GUILD_CREATE");
    assert_eq!(create.payload["id"], "42");

    let buffered = next_dispatch(&mut events).await;
    assert_eq!(buffered.kind, "MESSAGE_CREATE");

    match tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        GatewayEvent::ChunkingComplete => {}
        other => panic!("expected chunking-complete, got {other:?}"),
    }

    // Every chunked member is cached before anything was published
    assert_eq!(client.cache.member_count(Snowflake::new(42)), 2500);

    client.manager.shutdown().await;
}
