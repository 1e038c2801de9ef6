//! Caching event buffer
//!
//! Sits between the shards and subscribers, guaranteeing two things:
//! no guild-scoped event is visible before that guild's snapshot (and
//! member chunks, for large guilds) is fully cached, and every cacheable
//! event's mutation is applied before the event is published. Cache
//! mutation is synchronous on the emitting task, so the happens-before
//! contract holds by construction.

mod state;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pylon_cache::{CacheUpdater, EntityCache};
use pylon_common::GatewayConfig;
use pylon_core::{Snowflake, UnavailableGuild};
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::events::{DispatchEvent, GatewayEvent};
use crate::protocol::{GatewayMessage, RequestGuildMembersPayload};
use crate::shard::ShardMessenger;
use crate::util::await_with_retries;

use state::{expected_chunks, BufferState, ChunkProgress, PendingGuild};

/// Window after a small guild's snapshot to catch the role/channel burst
/// that often follows it
const GRACE_WINDOW: Duration = Duration::from_millis(100);

/// Chunk attempts per guild: the initial request and one retry
const CHUNK_ATTEMPTS: u32 = 2;

/// Event buffer with cache-consistency gating
pub struct CachingBuffer {
    cache: Arc<EntityCache>,
    updater: CacheUpdater,
    config: Arc<GatewayConfig>,
    /// Per-shard buffering state, created on READY
    states: DashMap<u16, BufferState>,
    events_tx: broadcast::Sender<GatewayEvent>,
    /// Resolved fleet size; 0 until the manager starts
    total_shards: AtomicU16,
    /// Guards the one-shot chunking-complete signal; re-armed by READY
    chunking_done: AtomicBool,
}

impl CachingBuffer {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>, cache: Arc<EntityCache>) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            cache,
            updater: CacheUpdater::new(),
            config,
            states: DashMap::new(),
            events_tx,
            total_shards: AtomicU16::new(0),
            chunking_done: AtomicBool::new(false),
        }
    }

    /// Subscribe to the ordered event stream
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events_tx.subscribe()
    }

    /// The cache this buffer mutates
    #[must_use]
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Recorded once the manager has resolved the fleet size; the
    /// chunking-complete signal needs it
    pub(crate) fn set_total_shards(&self, total: u16) {
        self.total_shards.store(total, Ordering::SeqCst);
    }

    /// Entry point: every dispatch event from every shard passes through
    /// here, in that shard's receipt order
    pub async fn process(self: Arc<Self>, event: DispatchEvent, messenger: &ShardMessenger) {
        match event.kind.as_str() {
            "READY" => self.handle_ready(event),
            "RESUMED" => self.emit(GatewayEvent::Dispatch(event)),
            "GUILD_CREATE" => self.handle_guild_create(event, messenger).await,
            "GUILD_MEMBERS_CHUNK" => self.handle_chunk(event),
            _ => self.handle_other(event),
        }
    }

    /// Step 1: (re)initialize the shard's state from the advertised guild
    /// set, cache the current-user snapshot, emit READY immediately
    fn handle_ready(&self, event: DispatchEvent) {
        let shard_id = event.shard_id;
        let guilds: Vec<UnavailableGuild> = event
            .payload
            .get("guilds")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let guild_ids: HashSet<Snowflake> = guilds.iter().map(|g| g.id).collect();

        tracing::info!(
            shard_id = %shard_id,
            guilds = guild_ids.len(),
            "Awaiting guild snapshots"
        );

        let empty = guild_ids.is_empty();
        self.states.insert(shard_id, BufferState::new(guild_ids));
        // A fresh load re-arms the lifecycle signal
        self.chunking_done.store(false, Ordering::SeqCst);

        self.apply_and_emit(event);
        if empty {
            self.check_chunking_complete();
        }
    }

    /// Step 2: gate an awaited guild's snapshot on chunks or the grace
    /// window; anything else flows through unbuffered
    async fn handle_guild_create(self: Arc<Self>, event: DispatchEvent, messenger: &ShardMessenger) {
        let shard_id = event.shard_id;
        let Some(guild_id) = event.guild_id() else {
            self.apply_and_emit(event);
            return;
        };

        let awaited = self
            .states
            .get(&shard_id)
            .is_some_and(|st| st.awaited.contains(&guild_id));
        if !awaited {
            // A guild joined after startup; no gating applies
            self.apply_and_emit(event);
            return;
        }

        // Snapshot goes into the cache now; emission is deferred
        self.updater
            .apply_raw(&self.cache, &event.kind, shard_id, &event.payload);

        let member_count = event
            .payload
            .get("member_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let needs_chunks =
            self.config.member_chunking && member_count > u64::from(self.config.large_threshold);

        if needs_chunks {
            let expected = expected_chunks(member_count);
            let (progress, progress_rx) = ChunkProgress::new(expected);

            tracing::debug!(
                shard_id = %shard_id,
                guild_id = %guild_id,
                member_count,
                expected_chunks = expected,
                "Large guild, requesting member chunks"
            );

            if let Some(mut st) = self.states.get_mut(&shard_id) {
                st.pending_guilds.insert(
                    guild_id,
                    PendingGuild {
                        create: event,
                        chunks: Some(progress),
                    },
                );
            }

            self.request_chunks(guild_id, messenger).await;

            let buffer = Arc::clone(&self);
            let messenger = messenger.clone();
            let timeout = self.config.chunk_timeout();
            tokio::spawn(async move {
                buffer
                    .chunk_watchdog(shard_id, guild_id, timeout, messenger, progress_rx)
                    .await;
            });
        } else {
            if let Some(mut st) = self.states.get_mut(&shard_id) {
                st.pending_guilds.insert(
                    guild_id,
                    PendingGuild {
                        create: event,
                        chunks: None,
                    },
                );
            }

            let buffer = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::time::sleep(GRACE_WINDOW).await;
                buffer.release_guild(shard_id, guild_id, "grace window elapsed");
            });
        }
    }

    /// Step 3: count a chunk toward an awaited guild; the final chunk
    /// releases the guild. Chunks for settled guilds flow through.
    fn handle_chunk(&self, event: DispatchEvent) {
        let shard_id = event.shard_id;
        let Some(guild_id) = event.guild_id() else {
            self.apply_and_emit(event);
            return;
        };

        let mut complete = false;
        if let Some(mut st) = self.states.get_mut(&shard_id) {
            if st.awaited.contains(&guild_id) {
                match st.pending_guilds.get_mut(&guild_id).and_then(|p| p.chunks.as_mut()) {
                    Some(progress) => {
                        // Consumed into the cache, never emitted: the stored
                        // GUILD_CREATE stands in for the whole snapshot
                        self.updater
                            .apply_raw(&self.cache, &event.kind, shard_id, &event.payload);
                        complete = progress.record_chunk();
                    }
                    None => {
                        // Awaited but not chunk-gated: keep receipt order
                        st.guild_buffers.entry(guild_id).or_default().push_back(event);
                    }
                }
            } else {
                drop(st);
                self.apply_and_emit(event);
                return;
            }
        } else {
            self.apply_and_emit(event);
            return;
        }

        if complete {
            self.release_guild(shard_id, guild_id, "all chunks cached");
        }
    }

    /// Steps 4 and 5: buffer events for awaited guilds and, while
    /// anything is awaited, events with no guild scope; everything else
    /// mutates the cache and goes straight out
    fn handle_other(&self, event: DispatchEvent) {
        let shard_id = event.shard_id;
        let guild_id = event.guild_id();

        if let Some(mut st) = self.states.get_mut(&shard_id) {
            match guild_id {
                Some(guild_id) if st.awaited.contains(&guild_id) => {
                    st.guild_buffers.entry(guild_id).or_default().push_back(event);
                    return;
                }
                None if !st.awaited.is_empty() => {
                    st.global_buffer.push_back(event);
                    return;
                }
                _ => {}
            }
        }

        self.apply_and_emit(event);
    }

    /// Release one guild: emit its stored snapshot, replay its queue in
    /// receipt order, and when it was the last awaited guild flush the
    /// global queue. The state entry stays locked through the replay so a
    /// concurrently arriving event cannot overtake it.
    fn release_guild(&self, shard_id: u16, guild_id: Snowflake, reason: &str) {
        let Some(mut st) = self.states.get_mut(&shard_id) else {
            return;
        };
        let Some(pending) = st.pending_guilds.remove(&guild_id) else {
            // Already released through another path
            return;
        };

        st.awaited.remove(&guild_id);
        let queued = st.guild_buffers.remove(&guild_id).unwrap_or_default();
        let drained_global = if st.awaited.is_empty() {
            std::mem::take(&mut st.global_buffer)
        } else {
            Default::default()
        };
        let all_done = st.awaited.is_empty();

        tracing::debug!(
            shard_id = %shard_id,
            guild_id = %guild_id,
            replayed = queued.len(),
            reason,
            "Releasing guild to subscribers"
        );

        // Snapshot mutation was applied at receipt time
        self.emit(GatewayEvent::Dispatch(pending.create));
        for event in queued {
            self.apply_and_emit(event);
        }
        for event in drained_global {
            self.apply_and_emit(event);
        }

        drop(st);
        if all_done {
            self.check_chunking_complete();
        }
    }

    /// Wait for the chunk counter to reach zero, re-requesting once after
    /// the first timeout. A second timeout force-releases the guild: a
    /// permanently awaited guild would pin its buffered events and stall
    /// the fleet-wide load signal forever.
    async fn chunk_watchdog(
        self: Arc<Self>,
        shard_id: u16,
        guild_id: Snowflake,
        timeout: Duration,
        messenger: ShardMessenger,
        progress_rx: watch::Receiver<u32>,
    ) {
        let outcome = await_with_retries(CHUNK_ATTEMPTS, timeout, |attempt| {
            let mut progress_rx = progress_rx.clone();
            let buffer = Arc::clone(&self);
            let messenger = messenger.clone();
            async move {
                if attempt > 0 {
                    tracing::warn!(
                        shard_id = %shard_id,
                        guild_id = %guild_id,
                        "Member chunks timed out, re-requesting once"
                    );
                    buffer.restart_chunking(shard_id, guild_id, &messenger).await;
                }
                // A dropped sender means the guild was released elsewhere
                let _ = progress_rx.wait_for(|remaining| *remaining == 0).await;
            }
        })
        .await;

        if outcome.is_err() {
            tracing::warn!(
                shard_id = %shard_id,
                guild_id = %guild_id,
                "Member chunks still incomplete after retry, releasing guild without them"
            );
            self.release_guild(shard_id, guild_id, "chunk timeout");
        }
    }

    /// Reset the chunk counter and re-issue the member request
    async fn restart_chunking(&self, shard_id: u16, guild_id: Snowflake, messenger: &ShardMessenger) {
        let still_pending = self.states.get_mut(&shard_id).is_some_and(|mut st| {
            match st.pending_guilds.get_mut(&guild_id).and_then(|p| p.chunks.as_mut()) {
                Some(progress) => {
                    progress.reset();
                    true
                }
                None => false,
            }
        });

        if still_pending {
            self.request_chunks(guild_id, messenger).await;
        }
    }

    async fn request_chunks(&self, guild_id: Snowflake, messenger: &ShardMessenger) {
        let request =
            GatewayMessage::request_guild_members(RequestGuildMembersPayload::all(guild_id));
        if messenger.send(request).await.is_err() {
            tracing::warn!(
                shard_id = %messenger.shard_id(),
                guild_id = %guild_id,
                "Chunk request dropped, connection is gone"
            );
        }
    }

    /// Synchronous mutation strictly before publication
    fn apply_and_emit(&self, event: DispatchEvent) {
        self.updater
            .apply_raw(&self.cache, &event.kind, event.shard_id, &event.payload);
        self.emit(GatewayEvent::Dispatch(event));
    }

    fn emit(&self, event: GatewayEvent) {
        // Send only fails with zero subscribers, which is fine
        let _ = self.events_tx.send(event);
    }

    /// Fire the cluster-wide signal once every shard's buffers are
    /// simultaneously empty
    fn check_chunking_complete(&self) {
        let total = usize::from(self.total_shards.load(Ordering::SeqCst));
        if total == 0 || self.states.len() < total {
            return;
        }
        if self.states.iter().any(|st| !st.is_empty()) {
            return;
        }
        if !self.chunking_done.swap(true, Ordering::SeqCst) {
            tracing::info!("Every shard finished its initial guild load");
            self.emit(GatewayEvent::ChunkingComplete);
        }
    }
}

impl std::fmt::Debug for CachingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingBuffer")
            .field("shards", &self.states.len())
            .field("total_shards", &self.total_shards.load(Ordering::SeqCst))
            .finish()
    }
}
