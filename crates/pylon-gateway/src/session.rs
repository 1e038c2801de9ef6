//! Session registry
//!
//! Per-shard storage of `(session_id, last_sequence)`. Each shard is the
//! only writer for its own entry; cross-shard access is limited to
//! diagnostic reads, so a concurrent map is all the coordination needed.

use dashmap::DashMap;

/// Stored session state for one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub session_id: String,
    pub sequence: u64,
}

/// Per-shard session store
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<u16, SessionData>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for a shard, if any
    pub fn get(&self, shard_id: u16) -> Option<SessionData> {
        self.sessions.get(&shard_id).map(|s| s.clone())
    }

    /// Store a fresh session id, keeping any sequence already recorded
    pub fn set_session_id(&self, shard_id: u16, session_id: impl Into<String>) {
        let session_id = session_id.into();
        self.sessions
            .entry(shard_id)
            .and_modify(|s| s.session_id = session_id.clone())
            .or_insert_with(|| SessionData {
                session_id,
                sequence: 0,
            });
    }

    /// Record the last seen sequence number for a shard
    ///
    /// A dispatch sequence can precede the session id within the same
    /// READY frame, so the entry is created on demand.
    pub fn update_sequence(&self, shard_id: u16, sequence: u64) {
        self.sessions
            .entry(shard_id)
            .and_modify(|s| s.sequence = sequence)
            .or_insert_with(|| SessionData {
                session_id: String::new(),
                sequence,
            });
    }

    /// Drop a shard's session entirely, forcing the next connect to
    /// identify
    pub fn clear(&self, shard_id: u16) {
        self.sessions.remove(&shard_id);
    }

    /// A shard may resume only with a stored session id and a sequence
    /// it has actually seen
    pub fn resumable(&self, shard_id: u16) -> bool {
        self.sessions
            .get(&shard_id)
            .is_some_and(|s| !s.session_id.is_empty() && s.sequence > 0)
    }
}
