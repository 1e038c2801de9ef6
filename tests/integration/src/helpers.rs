//! Test helpers
//!
//! A mock gateway server built on the accept side of tokio-tungstenite,
//! plus a fully wired client fleet with test-friendly timing.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use pylon_cache::EntityCache;
use pylon_common::GatewayConfig;
use pylon_gateway::{
    CachingBuffer, GatewayEvent, GatewayInfoProvider, GatewayRateLimiter, RestError,
    SessionRegistry, ShardManager,
};

/// Server end of one accepted gateway connection
pub type ServerSocket = WebSocketStream<TcpStream>;

/// In-process mock gateway: hands each upgraded connection to the test
pub struct MockGateway {
    pub url: String,
    connections: mpsc::Receiver<ServerSocket>,
    _accept_task: JoinHandle<()>,
}

impl MockGateway {
    /// Bind an ephemeral port and start accepting
    pub async fn spawn() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::channel(8);

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Ok(socket) = accept_async(stream).await else {
                    continue;
                };
                if tx.send(socket).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            url: format!("ws://{addr}"),
            connections,
            _accept_task: accept_task,
        })
    }

    /// Next upgraded connection from the client under test
    pub async fn next_connection(&mut self) -> ServerSocket {
        self.connections
            .recv()
            .await
            .expect("mock gateway accept loop ended")
    }
}

/// Send one JSON frame
pub async fn send_json(socket: &mut ServerSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("mock gateway write failed");
}

/// Read the next JSON frame, failing on close
pub async fn recv_json(socket: &mut ServerSocket) -> Value {
    loop {
        match socket
            .next()
            .await
            .expect("socket ended")
            .expect("socket errored")
        {
            Message::Text(text) => return serde_json::from_str(&text).expect("invalid frame json"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read frames until one with the wanted op arrives. Stray heartbeats are
/// acknowledged along the way so long-running tests never zombie.
pub async fn expect_op(socket: &mut ServerSocket, op: u8) -> Value {
    loop {
        let frame = recv_json(socket).await;
        let got = frame["op"].as_u64().expect("frame without op") as u8;
        if got == 1 && op != 1 {
            send_json(socket, json!({"op": 11})).await;
            continue;
        }
        assert_eq!(got, op, "unexpected frame: {frame}");
        return frame;
    }
}

/// Stub REST collaborator for tests that configure the count explicitly
pub struct StaticShardCount(pub u16);

#[async_trait]
impl GatewayInfoProvider for StaticShardCount {
    async fn recommended_shards(&self) -> Result<u16, RestError> {
        Ok(self.0)
    }
}

/// A fully wired client fleet against the mock gateway
pub struct TestClient {
    pub manager: ShardManager,
    pub buffer: Arc<CachingBuffer>,
    pub cache: Arc<EntityCache>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<GatewayConfig>,
}

impl TestClient {
    /// Build a fleet with test-friendly timing; nothing connects until
    /// `start` is called
    pub fn build(gateway_url: &str, shards: u16, identify_delay_ms: u64) -> Self {
        let mut config = GatewayConfig::new("test-token", gateway_url, "http://unused.test");
        config.shard_count = Some(shards);
        config.identify_delay_ms = identify_delay_ms;
        config.queue_poll_ms = 50;
        config.start_reply_timeout_ms = 5_000;
        config.chunk_timeout_ms = 500;
        let config = Arc::new(config);

        let cache = Arc::new(EntityCache::new());
        let buffer = Arc::new(CachingBuffer::new(Arc::clone(&config), Arc::clone(&cache)));
        let sessions = Arc::new(SessionRegistry::new());
        let limiter = Arc::new(GatewayRateLimiter::new(
            config.outbound_rate,
            config.identify_delay(),
        ));
        let manager = ShardManager::new(
            Arc::clone(&config),
            Arc::clone(&buffer),
            Arc::clone(&sessions),
            limiter,
        );

        Self {
            manager,
            buffer,
            cache,
            sessions,
            config,
        }
    }

    /// Deploy the fleet and return an event subscription opened before
    /// any frame can flow
    pub async fn start(&mut self) -> Result<broadcast::Receiver<GatewayEvent>> {
        let events = self.manager.subscribe();
        self.manager.start(&StaticShardCount(1)).await?;
        Ok(events)
    }
}

/// Receive the next dispatch event, skipping nothing
pub async fn next_dispatch(
    events: &mut broadcast::Receiver<GatewayEvent>,
) -> pylon_gateway::DispatchEvent {
    match tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
    {
        GatewayEvent::Dispatch(event) => event,
        other => panic!("expected dispatch, got {other:?}"),
    }
}
