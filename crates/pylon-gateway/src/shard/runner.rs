//! Shard connection runner
//!
//! One task per shard. The task idles on its command channel until the
//! manager's connect pump STARTs it, then owns the socket for the life of
//! one connection: HELLO handshake, heartbeat loop, dispatch forwarding,
//! and teardown. Every transport or protocol failure degrades to "close
//! and re-queue"; nothing here surfaces as a fatal error.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pylon_common::GatewayConfig;

use crate::buffer::CachingBuffer;
use crate::events::DispatchEvent;
use crate::limiter::GatewayRateLimiter;
use crate::manager::ConnectQueueHandle;
use crate::protocol::{CloseCode, GatewayMessage, IdentifyPayload, OpCode, ResumePayload};
use crate::session::SessionRegistry;
use crate::shard::commands::{ShardCommand, ShardMessenger, StartState};
use crate::shard::state::{ConnectionPhase, ShardState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Outgoing frame queue depth per connection
const OUTBOUND_BUFFER: usize = 100;

/// How one connection ended
enum Outcome {
    /// Socket gone; the shard re-queues itself
    Closed,
    /// STOP received; idle without re-queueing
    Stopped,
    /// Command channel gone; the task terminates
    Halted,
}

#[derive(PartialEq, Eq)]
enum FrameAction {
    Continue,
    Close,
}

/// Mutable state of the live connection
struct Connection {
    state: ShardState,
    messenger: ShardMessenger,
    heartbeat: Option<Interval>,
    /// When this connection started identifying; anchors the fleet
    /// pacing delay on the deferred START reply
    identify_started: Option<Instant>,
    pending_start: Option<oneshot::Sender<StartState>>,
}

/// Task body for one shard
pub(crate) struct ShardRunner {
    shard_id: u16,
    total_shards: u16,
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionRegistry>,
    limiter: Arc<GatewayRateLimiter>,
    buffer: Arc<CachingBuffer>,
    queue: ConnectQueueHandle,
    commands: mpsc::Receiver<ShardCommand>,
}

impl ShardRunner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shard_id: u16,
        total_shards: u16,
        config: Arc<GatewayConfig>,
        sessions: Arc<SessionRegistry>,
        limiter: Arc<GatewayRateLimiter>,
        buffer: Arc<CachingBuffer>,
        queue: ConnectQueueHandle,
        commands: mpsc::Receiver<ShardCommand>,
    ) -> Self {
        Self {
            shard_id,
            total_shards,
            config,
            sessions,
            limiter,
            buffer,
            queue,
            commands,
        }
    }

    /// Command loop; runs until the manager drops the command channel
    pub(crate) async fn run(mut self) {
        loop {
            match self.commands.recv().await {
                None => return,
                Some(ShardCommand::Stop) => {
                    tracing::debug!(shard_id = %self.shard_id, "STOP while disconnected");
                }
                Some(ShardCommand::Trace { reply }) => {
                    let mut state = ShardState::new(self.shard_id, self.total_shards);
                    if let Some(session) = self.sessions.get(self.shard_id) {
                        state.session_id = Some(session.session_id);
                        state.sequence = session.sequence;
                    }
                    let _ = reply.send(state.trace_lines());
                }
                Some(ShardCommand::Start { reply }) => {
                    match self.run_connection(reply).await {
                        Outcome::Closed => self.queue.requeue(self.shard_id).await,
                        Outcome::Stopped => {}
                        Outcome::Halted => return,
                    }
                }
            }
        }
    }

    /// Own the socket for one connection cycle
    async fn run_connection(&mut self, reply: oneshot::Sender<StartState>) -> Outcome {
        let stream = match connect_async(self.config.gateway_url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::warn!(
                    shard_id = %self.shard_id,
                    error = %e,
                    "Failed to open gateway socket"
                );
                let _ = reply.send(StartState::Failed);
                return Outcome::Closed;
            }
        };

        tracing::info!(shard_id = %self.shard_id, "Gateway socket opened");

        let (sink, mut source) = stream.split();
        let (tx, rx) = mpsc::channel::<GatewayMessage>(OUTBOUND_BUFFER);
        let messenger = ShardMessenger::new(self.shard_id, tx);
        let writer = tokio::spawn(write_loop(
            self.shard_id,
            sink,
            rx,
            Arc::clone(&self.limiter),
        ));

        let mut state = ShardState::new(self.shard_id, self.total_shards);
        state.phase = ConnectionPhase::Connecting;
        if let Some(session) = self.sessions.get(self.shard_id) {
            state.session_id = Some(session.session_id);
            state.sequence = session.sequence;
        }

        let mut conn = Connection {
            state,
            messenger,
            heartbeat: None,
            identify_started: None,
            pending_start: Some(reply),
        };

        let outcome = loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.handle_frame(&mut conn, &text).await == FrameAction::Close {
                            break Outcome::Closed;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.handle_close_frame(frame.as_ref());
                        break Outcome::Closed;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(shard_id = %self.shard_id, "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(shard_id = %self.shard_id, error = %e, "Socket read failed");
                        break Outcome::Closed;
                    }
                    None => {
                        tracing::info!(shard_id = %self.shard_id, "Socket stream ended");
                        break Outcome::Closed;
                    }
                },
                _ = heartbeat_tick(&mut conn.heartbeat) => {
                    if !conn.state.heartbeat_acked {
                        tracing::warn!(
                            shard_id = %self.shard_id,
                            "Heartbeat was never acknowledged, closing zombie connection"
                        );
                        break Outcome::Closed;
                    }
                    conn.state.heartbeat_acked = false;
                    let beat = GatewayMessage::heartbeat(conn.state.heartbeat_sequence());
                    if conn.messenger.send(beat).await.is_err() {
                        break Outcome::Closed;
                    }
                },
                cmd = self.commands.recv() => match cmd {
                    Some(ShardCommand::Stop) => {
                        tracing::info!(shard_id = %self.shard_id, "STOP received, closing connection");
                        break Outcome::Stopped;
                    }
                    Some(ShardCommand::Trace { reply }) => {
                        let _ = reply.send(conn.state.trace_lines());
                    }
                    Some(ShardCommand::Start { reply }) => {
                        // Unreachable through the queue's dedup; answer with
                        // the current state so the pump advances
                        tracing::warn!(shard_id = %self.shard_id, "START while already connected");
                        let settled = conn.state.phase == ConnectionPhase::Connected;
                        let _ = reply.send(if settled { StartState::Ready } else { StartState::Failed });
                    }
                    None => break Outcome::Halted,
                },
            }
        };

        // An unresolved handshake is a failure; the pump re-queues us.
        // On STOP the reply is dropped instead: the manager is shutting
        // down and nothing should re-enter the queue.
        if let Some(pending) = conn.pending_start.take() {
            if matches!(outcome, Outcome::Closed) {
                let _ = pending.send(StartState::Failed);
            }
        }

        // Dropping the sink closes the socket and stops the heartbeat
        writer.abort();
        drop(source);

        tracing::info!(shard_id = %self.shard_id, "Connection torn down");
        outcome
    }

    /// Dispatch one text frame by opcode
    async fn handle_frame(&self, conn: &mut Connection, text: &str) -> FrameAction {
        let frame = match GatewayMessage::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(shard_id = %self.shard_id, error = %e, "Dropping malformed frame");
                return FrameAction::Continue;
            }
        };

        match frame.op {
            OpCode::Hello => self.handle_hello(conn, &frame).await,
            OpCode::Dispatch => self.handle_dispatch(conn, frame).await,
            OpCode::HeartbeatAck => {
                conn.state.heartbeat_acked = true;
                FrameAction::Continue
            }
            OpCode::Heartbeat => {
                // Server-requested heartbeat: answer immediately
                let beat = GatewayMessage::heartbeat(conn.state.heartbeat_sequence());
                if conn.messenger.send(beat).await.is_err() {
                    return FrameAction::Close;
                }
                FrameAction::Continue
            }
            OpCode::InvalidSession => {
                let resumable = frame.as_invalid_session().unwrap_or(false);
                tracing::warn!(
                    shard_id = %self.shard_id,
                    resumable,
                    "Session invalidated by the gateway"
                );
                if !resumable {
                    self.sessions.clear(self.shard_id);
                    conn.state.clear_session();
                }
                // Closing forces a connect cycle that resumes or
                // re-identifies based on what survived above
                FrameAction::Close
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = %self.shard_id, "Reconnect requested by the gateway");
                FrameAction::Close
            }
            _ => {
                tracing::warn!(
                    shard_id = %self.shard_id,
                    op = %frame.op,
                    "Dropping client-only opcode sent by the server"
                );
                FrameAction::Continue
            }
        }
    }

    /// HELLO: start the heartbeat loop, then resume or identify
    async fn handle_hello(&self, conn: &mut Connection, frame: &GatewayMessage) -> FrameAction {
        let Some(hello) = frame.as_hello() else {
            tracing::warn!(shard_id = %self.shard_id, "Dropping malformed HELLO payload");
            return FrameAction::Continue;
        };

        let interval = Duration::from_millis(hello.heartbeat_interval);
        conn.state.heartbeat_interval = Some(interval);
        conn.state.trace = hello.trace;
        conn.state.heartbeat_acked = true;

        // First beat lands at a random fraction of the interval so a fleet
        // restart does not heartbeat in lockstep
        let jitter = interval.mul_f64(rand::random::<f64>());
        let mut timer = interval_at(Instant::now() + jitter, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        conn.heartbeat = Some(timer);

        let session = self
            .sessions
            .get(self.shard_id)
            .filter(|s| !s.session_id.is_empty() && s.sequence > 0);

        let frame = match session {
            Some(session) => {
                tracing::info!(
                    shard_id = %self.shard_id,
                    session_id = %session.session_id,
                    seq = session.sequence,
                    "Resuming session"
                );
                conn.state.phase = ConnectionPhase::Resuming;
                GatewayMessage::resume(ResumePayload {
                    token: self.config.token.clone(),
                    session_id: session.session_id,
                    seq: session.sequence,
                })
            }
            None => {
                // Fleet-wide identify spacing: one token per delay window
                self.limiter.acquire_identify().await;
                conn.identify_started = Some(Instant::now());
                conn.state.phase = ConnectionPhase::Identifying;
                tracing::info!(shard_id = %self.shard_id, "Identifying");
                GatewayMessage::identify(
                    IdentifyPayload::new(self.config.token.clone(), self.shard_id, self.total_shards)
                        .with_large_threshold(self.config.large_threshold)
                        .with_presence(self.config.presence.clone()),
                )
            }
        };

        if conn.messenger.send(frame).await.is_err() {
            return FrameAction::Close;
        }
        FrameAction::Continue
    }

    /// DISPATCH: record the sequence, hand the event to the buffer, then
    /// settle READY/RESUMED bookkeeping
    async fn handle_dispatch(&self, conn: &mut Connection, frame: GatewayMessage) -> FrameAction {
        if let Some(seq) = frame.s {
            conn.state.sequence = seq;
            self.sessions.update_sequence(self.shard_id, seq);
        }

        let Some(kind) = frame.t else {
            tracing::warn!(shard_id = %self.shard_id, "Dropping dispatch without event type");
            return FrameAction::Continue;
        };
        let payload = frame.d.unwrap_or(Value::Null);

        // Pull the session id out before the payload moves into the buffer
        let ready_session = (kind == "READY")
            .then(|| {
                payload
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .flatten();

        let event = DispatchEvent {
            shard_id: self.shard_id,
            kind: kind.clone(),
            sequence: frame.s,
            payload,
        };

        // The buffer sees every event before any other action
        Arc::clone(&self.buffer).process(event, &conn.messenger).await;

        match kind.as_str() {
            "READY" => {
                if let Some(session_id) = ready_session {
                    self.sessions.set_session_id(self.shard_id, &session_id);
                    conn.state.session_id = Some(session_id);
                }
                conn.state.phase = ConnectionPhase::Connected;
                tracing::info!(shard_id = %self.shard_id, "Shard ready");

                // The deferred START reply is the fleet pacing mechanism:
                // it resolves only once the minimum identify spacing has
                // elapsed since this connection began identifying
                if let Some(reply) = conn.pending_start.take() {
                    let deadline = conn.identify_started.unwrap_or_else(Instant::now)
                        + self.config.identify_delay();
                    let shard_id = self.shard_id;
                    tokio::spawn(async move {
                        sleep_until(deadline).await;
                        if reply.send(StartState::Ready).is_err() {
                            tracing::debug!(shard_id = %shard_id, "START reply receiver gone");
                        }
                    });
                }
            }
            "RESUMED" => {
                conn.state.phase = ConnectionPhase::Connected;
                tracing::info!(shard_id = %self.shard_id, "Shard resumed");

                // Resume carries no identify cost; reply right away
                if let Some(reply) = conn.pending_start.take() {
                    let _ = reply.send(StartState::Resumed);
                }
            }
            _ => {}
        }

        FrameAction::Continue
    }

    /// Log the server's close code; some codes kill the stored session
    fn handle_close_frame(&self, frame: Option<&CloseFrame<'_>>) {
        match frame {
            Some(frame) => {
                let code = u16::from(frame.code);
                match CloseCode::from_u16(code) {
                    Some(close_code) => {
                        tracing::warn!(
                            shard_id = %self.shard_id,
                            code = %close_code,
                            "Gateway closed the connection"
                        );
                        if close_code.invalidates_session() {
                            self.sessions.clear(self.shard_id);
                        }
                    }
                    None => {
                        tracing::info!(
                            shard_id = %self.shard_id,
                            code,
                            reason = %frame.reason,
                            "Connection closed"
                        );
                    }
                }
            }
            None => {
                tracing::info!(shard_id = %self.shard_id, "Connection closed without close frame");
            }
        }
    }
}

/// Resolve the next heartbeat tick, or never when the timer is not
/// running yet (before HELLO)
async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

/// Writer task: drains the outgoing queue through the rate limiter
async fn write_loop(
    shard_id: u16,
    mut sink: WsSink,
    mut rx: mpsc::Receiver<GatewayMessage>,
    limiter: Arc<GatewayRateLimiter>,
) {
    while let Some(frame) = rx.recv().await {
        limiter.acquire_send(shard_id).await;
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(shard_id = %shard_id, error = %e, "Failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!(shard_id = %shard_id, error = %e, "Socket write failed");
            break;
        }
    }
    let _ = sink.close().await;
}
