//! Shard control channel
//!
//! The manager talks to a shard only through these messages; the shard
//! talks back only through the bounded reply channels they carry.

use tokio::sync::{mpsc, oneshot};

use crate::protocol::GatewayMessage;

/// Terminal state of a START handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    /// Fresh session established (identify path)
    Ready,
    /// Prior session reattached (resume path)
    Resumed,
    /// Connection failed or closed before the handshake settled
    Failed,
}

impl std::fmt::Display for StartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::Failed => "FAILED",
        })
    }
}

/// Control messages from the manager
#[derive(Debug)]
pub(crate) enum ShardCommand {
    /// Connect and complete a handshake; the reply resolves once the
    /// handshake settles (and, for a fresh identify, the fleet pacing
    /// delay has elapsed)
    Start { reply: oneshot::Sender<StartState> },
    /// Tear down the connection without re-queueing
    Stop,
    /// Report gateway debug trace lines
    Trace { reply: oneshot::Sender<Vec<String>> },
}

/// Cloneable handle for writing frames to a shard's socket
///
/// Frames are queued to the connection's writer task, which paces them
/// through the rate limiter before hitting the wire.
#[derive(Debug, Clone)]
pub struct ShardMessenger {
    shard_id: u16,
    tx: mpsc::Sender<GatewayMessage>,
}

impl ShardMessenger {
    pub(crate) fn new(shard_id: u16, tx: mpsc::Sender<GatewayMessage>) -> Self {
        Self { shard_id, tx }
    }

    /// Shard this messenger writes to
    #[must_use]
    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    /// Queue a frame for sending; fails once the connection is gone
    pub async fn send(
        &self,
        frame: GatewayMessage,
    ) -> Result<(), mpsc::error::SendError<GatewayMessage>> {
        self.tx.send(frame).await
    }

    /// Whether the connection behind this messenger is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
