//! Per-connection shard state
//!
//! Owned exclusively by the shard's task and mutated only on its own
//! event-processing path, so no interior mutability is needed.

use std::time::Duration;

/// Connection phase of the protocol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No socket; waiting for the connect queue
    Disconnected,
    /// Socket opening, HELLO not yet received
    Connecting,
    /// IDENTIFY sent, waiting for READY
    Identifying,
    /// RESUME sent, waiting for RESUMED
    Resuming,
    /// Handshake settled; normal event flow
    Connected,
}

/// Mutable state of one shard connection
#[derive(Debug, Clone)]
pub struct ShardState {
    pub shard_id: u16,
    pub total_shards: u16,
    pub phase: ConnectionPhase,
    /// Last dispatch sequence seen, 0 before the first one
    pub sequence: u64,
    pub session_id: Option<String>,
    pub heartbeat_interval: Option<Duration>,
    /// False while a heartbeat is in flight without an ACK
    pub heartbeat_acked: bool,
    /// Gateway debug trace from HELLO/READY
    pub trace: Vec<String>,
}

impl ShardState {
    #[must_use]
    pub fn new(shard_id: u16, total_shards: u16) -> Self {
        Self {
            shard_id,
            total_shards,
            phase: ConnectionPhase::Disconnected,
            sequence: 0,
            session_id: None,
            heartbeat_interval: None,
            heartbeat_acked: true,
            trace: Vec::new(),
        }
    }

    /// Sequence to send with a heartbeat: `None` before any dispatch
    #[must_use]
    pub fn heartbeat_sequence(&self) -> Option<u64> {
        (self.sequence > 0).then_some(self.sequence)
    }

    /// Forget the session, forcing the next HELLO to identify
    pub fn clear_session(&mut self) {
        self.session_id = None;
        self.sequence = 0;
    }

    /// Human-readable lines for the TRACE control op
    #[must_use]
    pub fn trace_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "shard {}/{} phase={:?}",
                self.shard_id, self.total_shards, self.phase
            ),
            format!(
                "session={} seq={}",
                self.session_id.as_deref().unwrap_or("-"),
                self.sequence
            ),
            format!(
                "heartbeat interval={:?} acked={}",
                self.heartbeat_interval, self.heartbeat_acked
            ),
        ];
        lines.extend(self.trace.iter().cloned());
        lines
    }
}
