//! Per-shard buffering state
//!
//! Created on READY, shrunk as each guild's snapshot (and chunks, when
//! required) lands in the cache. Only the owning shard's task and that
//! guild's timer callbacks ever touch an entry.

use std::collections::{HashMap, HashSet, VecDeque};

use pylon_core::Snowflake;
use tokio::sync::watch;

use crate::events::DispatchEvent;

/// Members delivered per chunk
pub(crate) const MEMBERS_PER_CHUNK: u64 = 1000;

/// `ceil(member_count / 1000)`
pub(crate) fn expected_chunks(member_count: u64) -> u32 {
    member_count.div_ceil(MEMBERS_PER_CHUNK) as u32
}

/// Chunk accounting for one large guild
pub(crate) struct ChunkProgress {
    expected: u32,
    remaining: u32,
    /// Publishes `remaining` for the timeout watchdog
    progress: watch::Sender<u32>,
}

impl ChunkProgress {
    pub(crate) fn new(expected: u32) -> (Self, watch::Receiver<u32>) {
        let (progress, rx) = watch::channel(expected);
        (
            Self {
                expected,
                remaining: expected,
                progress,
            },
            rx,
        )
    }

    /// Count one received chunk; true once all chunks have arrived
    pub(crate) fn record_chunk(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        let _ = self.progress.send(self.remaining);
        self.remaining == 0
    }

    /// Fresh counter for a re-issued chunk request
    pub(crate) fn reset(&mut self) {
        self.remaining = self.expected;
        let _ = self.progress.send(self.remaining);
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// A guild whose snapshot is held back from subscribers
pub(crate) struct PendingGuild {
    /// The raw GUILD_CREATE event, emitted on release
    pub(crate) create: DispatchEvent,
    /// Present when member chunks gate the release
    pub(crate) chunks: Option<ChunkProgress>,
}

/// Buffering state for one shard
pub(crate) struct BufferState {
    /// Guilds whose events must not reach subscribers yet
    pub(crate) awaited: HashSet<Snowflake>,
    /// Held-back snapshots, keyed by guild
    pub(crate) pending_guilds: HashMap<Snowflake, PendingGuild>,
    /// Events buffered per awaited guild, in receipt order
    pub(crate) guild_buffers: HashMap<Snowflake, VecDeque<DispatchEvent>>,
    /// Events without a guild id received while any guild is awaited
    pub(crate) global_buffer: VecDeque<DispatchEvent>,
}

impl BufferState {
    pub(crate) fn new(guild_ids: impl IntoIterator<Item = Snowflake>) -> Self {
        Self {
            awaited: guild_ids.into_iter().collect(),
            pending_guilds: HashMap::new(),
            guild_buffers: HashMap::new(),
            global_buffer: VecDeque::new(),
        }
    }

    /// Nothing awaited and nothing buffered
    pub(crate) fn is_empty(&self) -> bool {
        self.awaited.is_empty() && self.global_buffer.is_empty()
    }
}
