//! Shard manager
//!
//! Deploys one shard task per id, owns the connect queue pump that
//! serializes identify handshakes across the fleet, and re-queues shards
//! whose handshake never settles. The pump advancing only on a settled
//! START reply is what enforces the fleet-wide identify pacing.

mod queue;

pub(crate) use queue::ConnectQueueHandle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use pylon_common::GatewayConfig;

use crate::buffer::CachingBuffer;
use crate::error::{StartupError, TraceError};
use crate::events::GatewayEvent;
use crate::limiter::GatewayRateLimiter;
use crate::rest::GatewayInfoProvider;
use crate::session::SessionRegistry;
use crate::shard::{ShardCommand, ShardRunner, StartState};

use queue::ConnectQueue;

/// Capacity of the enqueue channel feeding the pump
const QUEUE_BUFFER: usize = 1024;

/// Command channel depth per shard
const COMMAND_BUFFER: usize = 16;

/// Bound on a TRACE reply
const TRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fleet coordinator for all shard connections
pub struct ShardManager {
    config: Arc<GatewayConfig>,
    buffer: Arc<CachingBuffer>,
    sessions: Arc<SessionRegistry>,
    limiter: Arc<GatewayRateLimiter>,
    shards: HashMap<u16, mpsc::Sender<ShardCommand>>,
    queue_tx: mpsc::Sender<u16>,
    /// Taken by the pump on start
    queue_rx: Option<mpsc::Receiver<u16>>,
    pump: Option<JoinHandle<()>>,
}

impl ShardManager {
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        buffer: Arc<CachingBuffer>,
        sessions: Arc<SessionRegistry>,
        limiter: Arc<GatewayRateLimiter>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_BUFFER);
        Self {
            config,
            buffer,
            sessions,
            limiter,
            shards: HashMap::new(),
            queue_tx,
            queue_rx: Some(queue_rx),
            pump: None,
        }
    }

    /// Resolve the shard count: the configured value, or the REST
    /// collaborator's recommendation. Failure here is fatal to startup.
    pub async fn shard_count(
        &self,
        rest: &dyn GatewayInfoProvider,
    ) -> Result<u16, StartupError> {
        let count = match self.config.shard_count {
            Some(count) => count,
            None => rest
                .recommended_shards()
                .await
                .map_err(StartupError::ShardCount)?,
        };
        if count == 0 {
            return Err(StartupError::ZeroShards);
        }
        Ok(count)
    }

    /// Deploy one shard per id in `[0, shard_count)` and seed the connect
    /// queue ascending. Returns the resolved shard count.
    pub async fn start(&mut self, rest: &dyn GatewayInfoProvider) -> Result<u16, StartupError> {
        let total = self.shard_count(rest).await?;
        self.buffer.set_total_shards(total);

        tracing::info!(shards = total, "Deploying shard fleet");

        for shard_id in 0..total {
            let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
            let runner = ShardRunner::new(
                shard_id,
                total,
                Arc::clone(&self.config),
                Arc::clone(&self.sessions),
                Arc::clone(&self.limiter),
                Arc::clone(&self.buffer),
                ConnectQueueHandle::new(self.queue_tx.clone()),
                commands_rx,
            );
            tokio::spawn(runner.run());
            self.shards.insert(shard_id, commands_tx);
        }

        // The pump must be draining before the seed fills the channel
        if let Some(queue_rx) = self.queue_rx.take() {
            let pump = run_pump(queue_rx, self.shards.clone(), Arc::clone(&self.config));
            self.pump = Some(tokio::spawn(pump));
        } else {
            tracing::warn!("Shard manager started twice, keeping the existing pump");
        }

        for shard_id in 0..total {
            self.enqueue(shard_id).await;
        }

        Ok(total)
    }

    /// Put a shard in line for a connect cycle; duplicates are dropped by
    /// the pump
    pub async fn enqueue(&self, shard_id: u16) {
        if self.queue_tx.send(shard_id).await.is_err() {
            tracing::warn!(shard_id = %shard_id, "Connect queue is gone");
        }
    }

    /// Subscribe to the cache-consistent event stream
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.buffer.subscribe()
    }

    /// Ask a live shard for its gateway debug trace
    pub async fn trace(&self, shard_id: u16) -> Result<Vec<String>, TraceError> {
        let commands = self
            .shards
            .get(&shard_id)
            .ok_or(TraceError::Unreachable(shard_id))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(ShardCommand::Trace { reply: reply_tx })
            .await
            .map_err(|_| TraceError::Unreachable(shard_id))?;

        match tokio::time::timeout(TRACE_TIMEOUT, reply_rx).await {
            Ok(Ok(lines)) => Ok(lines),
            Ok(Err(_)) => Err(TraceError::Unreachable(shard_id)),
            Err(_) => Err(TraceError::Timeout(shard_id)),
        }
    }

    /// Stop the pump and broadcast STOP to every shard index
    pub async fn shutdown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        for (shard_id, commands) in &self.shards {
            if commands.send(ShardCommand::Stop).await.is_err() {
                tracing::debug!(shard_id = %shard_id, "Shard already gone");
            }
        }

        tracing::info!("Shard manager shut down");
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("shards", &self.shards.len())
            .field("running", &self.pump.is_some())
            .finish()
    }
}

/// Pump: pops the next shard id, STARTs it, and advances only once the
/// handshake settles. Failures re-queue at the tail and never abort the
/// pump.
async fn run_pump(
    mut queue_rx: mpsc::Receiver<u16>,
    shards: HashMap<u16, mpsc::Sender<ShardCommand>>,
    config: Arc<GatewayConfig>,
) {
    let mut queue = ConnectQueue::new();

    loop {
        // Fold pending enqueue requests into the FIFO
        loop {
            match queue_rx.try_recv() {
                Ok(shard_id) => {
                    if !queue.push(shard_id) {
                        tracing::debug!(shard_id = %shard_id, "Already queued, ignoring duplicate");
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    tracing::info!("Connect queue closed, pump exiting");
                    return;
                }
            }
        }

        let Some(shard_id) = queue.pop() else {
            tokio::time::sleep(config.queue_poll()).await;
            continue;
        };

        let Some(commands) = shards.get(&shard_id) else {
            tracing::warn!(shard_id = %shard_id, "Unknown shard id in connect queue");
            continue;
        };

        tracing::info!(shard_id = %shard_id, waiting = queue.len(), "Starting shard");

        let (reply_tx, reply_rx) = oneshot::channel();
        if commands
            .send(ShardCommand::Start { reply: reply_tx })
            .await
            .is_err()
        {
            tracing::warn!(shard_id = %shard_id, "Shard unreachable for START, re-queueing");
            queue.push(shard_id);
            tokio::time::sleep(config.queue_poll()).await;
            continue;
        }

        match tokio::time::timeout(config.start_reply_timeout(), reply_rx).await {
            Ok(Ok(StartState::Ready)) => {
                tracing::info!(shard_id = %shard_id, "Shard identify settled");
            }
            Ok(Ok(StartState::Resumed)) => {
                tracing::info!(shard_id = %shard_id, "Shard resumed");
            }
            Ok(Ok(StartState::Failed)) | Ok(Err(_)) | Err(_) => {
                // Tail re-queue, with one poll delay so a dead gateway
                // does not produce a hot loop
                tracing::warn!(shard_id = %shard_id, "START did not settle, re-queueing at the tail");
                queue.push(shard_id);
                tokio::time::sleep(config.queue_poll()).await;
            }
        }
    }
}
