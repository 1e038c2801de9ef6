//! Connect queue
//!
//! FIFO of shard ids waiting for their identify turn. The pump task owns
//! the queue itself; everyone else (the manager's public API, shards
//! re-queueing themselves after a close) reaches it only through the
//! message-passing handle.

use std::collections::{HashSet, VecDeque};

use tokio::sync::mpsc;

/// Cloneable enqueue handle
#[derive(Debug, Clone)]
pub(crate) struct ConnectQueueHandle {
    tx: mpsc::Sender<u16>,
}

impl ConnectQueueHandle {
    pub(crate) fn new(tx: mpsc::Sender<u16>) -> Self {
        Self { tx }
    }

    /// Put a shard back in line; losing the queue is only possible during
    /// shutdown, so it is logged and swallowed
    pub(crate) async fn requeue(&self, shard_id: u16) {
        if self.tx.send(shard_id).await.is_err() {
            tracing::warn!(shard_id = %shard_id, "Connect queue is gone, shard not re-queued");
        }
    }
}

/// FIFO with idempotent enqueue
pub(crate) struct ConnectQueue {
    fifo: VecDeque<u16>,
    queued: HashSet<u16>,
}

impl ConnectQueue {
    pub(crate) fn new() -> Self {
        Self {
            fifo: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    /// Append at the tail; false when the id is already waiting
    pub(crate) fn push(&mut self, shard_id: u16) -> bool {
        if self.queued.insert(shard_id) {
            self.fifo.push_back(shard_id);
            true
        } else {
            false
        }
    }

    pub(crate) fn pop(&mut self) -> Option<u16> {
        let shard_id = self.fifo.pop_front()?;
        self.queued.remove(&shard_id);
        Some(shard_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.fifo.len()
    }
}
