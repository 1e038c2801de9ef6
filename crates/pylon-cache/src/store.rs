//! Entity cache store
//!
//! Concurrent maps keyed by snowflake id. Top-level maps hold guilds,
//! users, and presences; per-guild sub-maps hold members, roles, channels,
//! emoji, and voice states. Sub-maps are created lazily through the entry
//! API, which is race-safe under concurrent shard writers.
//!
//! All upserts are idempotent and all removals are no-ops when the target
//! is absent.

use dashmap::DashMap;
use parking_lot::RwLock;
use pylon_core::{Channel, Emoji, Guild, Member, Presence, Role, Snowflake, User, VoiceState};

/// Concurrent entity cache
#[derive(Default)]
pub struct EntityCache {
    /// Snapshot of the authenticated user, set on READY
    current_user: RwLock<Option<User>>,

    guilds: DashMap<Snowflake, Guild>,
    users: DashMap<Snowflake, User>,
    presences: DashMap<Snowflake, Presence>,

    /// guild id -> user id -> member
    members: DashMap<Snowflake, DashMap<Snowflake, Member>>,
    /// guild id -> role id -> role
    roles: DashMap<Snowflake, DashMap<Snowflake, Role>>,
    /// guild id -> channel id -> channel
    channels: DashMap<Snowflake, DashMap<Snowflake, Channel>>,
    /// guild id -> emoji id -> emoji
    emojis: DashMap<Snowflake, DashMap<Snowflake, Emoji>>,
    /// guild id -> user id -> voice state
    voice_states: DashMap<Snowflake, DashMap<Snowflake, VoiceState>>,
}

impl EntityCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Current user ===

    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().clone()
    }

    pub fn set_current_user(&self, user: User) {
        self.users.insert(user.id, user.clone());
        *self.current_user.write() = Some(user);
    }

    // === Guilds ===

    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.get(&id).map(|g| g.clone())
    }

    /// Load a full guild snapshot: the nested collections are drained into
    /// the per-guild stores and the guild record is kept without them.
    pub fn load_guild(&self, mut guild: Guild) {
        let guild_id = guild.id;

        for role in guild.roles.drain(..) {
            self.put_role(guild_id, role);
        }
        for channel in guild.channels.drain(..) {
            self.put_channel(guild_id, channel);
        }
        for emoji in guild.emojis.drain(..) {
            self.put_emoji(guild_id, emoji);
        }
        for voice_state in guild.voice_states.drain(..) {
            self.put_voice_state(guild_id, voice_state);
        }
        for presence in guild.presences.drain(..) {
            self.put_presence(presence);
        }
        let members: Vec<Member> = guild.members.drain(..).collect();
        self.load_members(guild_id, members);

        self.guilds.insert(guild_id, guild);
    }

    /// Mark a guild unavailable without dropping its cached state
    pub fn mark_guild_unavailable(&self, id: Snowflake) {
        if let Some(mut guild) = self.guilds.get_mut(&id) {
            guild.unavailable = true;
        }
    }

    /// Remove a guild and all of its per-guild entities
    pub fn remove_guild(&self, id: Snowflake) {
        self.guilds.remove(&id);
        self.members.remove(&id);
        self.roles.remove(&id);
        self.channels.remove(&id);
        self.emojis.remove(&id);
        self.voice_states.remove(&id);
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    // === Users ===

    pub fn user(&self, id: Snowflake) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn put_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // === Members ===

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Member> {
        self.members
            .get(&guild_id)
            .and_then(|m| m.get(&user_id).map(|v| v.clone()))
    }

    pub fn put_member(&self, guild_id: Snowflake, member: Member) {
        if let Some(user) = member.user.clone() {
            let user_id = user.id;
            self.users.insert(user_id, user);
            self.members.entry(guild_id).or_default().insert(user_id, member);
        }
    }

    /// Bulk-insert members, as delivered by a guild snapshot or chunk
    pub fn load_members(&self, guild_id: Snowflake, members: Vec<Member>) {
        let map = self.members.entry(guild_id).or_default();
        for member in members {
            if let Some(user) = member.user.clone() {
                let user_id = user.id;
                self.users.insert(user_id, user);
                map.insert(user_id, member);
            }
        }
    }

    pub fn remove_member(&self, guild_id: Snowflake, user_id: Snowflake) {
        if let Some(map) = self.members.get(&guild_id) {
            map.remove(&user_id);
        }
    }

    pub fn member_count(&self, guild_id: Snowflake) -> usize {
        self.members.get(&guild_id).map_or(0, |m| m.len())
    }

    // === Roles ===

    pub fn role(&self, guild_id: Snowflake, role_id: Snowflake) -> Option<Role> {
        self.roles
            .get(&guild_id)
            .and_then(|r| r.get(&role_id).map(|v| v.clone()))
    }

    pub fn put_role(&self, guild_id: Snowflake, role: Role) {
        self.roles.entry(guild_id).or_default().insert(role.id, role);
    }

    pub fn remove_role(&self, guild_id: Snowflake, role_id: Snowflake) {
        if let Some(map) = self.roles.get(&guild_id) {
            map.remove(&role_id);
        }
    }

    // === Channels ===

    pub fn channel(&self, guild_id: Snowflake, channel_id: Snowflake) -> Option<Channel> {
        self.channels
            .get(&guild_id)
            .and_then(|c| c.get(&channel_id).map(|v| v.clone()))
    }

    pub fn put_channel(&self, guild_id: Snowflake, channel: Channel) {
        self.channels
            .entry(guild_id)
            .or_default()
            .insert(channel.id, channel);
    }

    pub fn remove_channel(&self, guild_id: Snowflake, channel_id: Snowflake) {
        if let Some(map) = self.channels.get(&guild_id) {
            map.remove(&channel_id);
        }
    }

    // === Emoji ===

    pub fn emoji(&self, guild_id: Snowflake, emoji_id: Snowflake) -> Option<Emoji> {
        self.emojis
            .get(&guild_id)
            .and_then(|e| e.get(&emoji_id).map(|v| v.clone()))
    }

    /// Unicode emoji carry no id and are skipped
    pub fn put_emoji(&self, guild_id: Snowflake, emoji: Emoji) {
        if let Some(id) = emoji.id {
            self.emojis.entry(guild_id).or_default().insert(id, emoji);
        }
    }

    /// Replace a guild's emoji list wholesale (GUILD_EMOJIS_UPDATE)
    pub fn replace_emojis(&self, guild_id: Snowflake, emojis: Vec<Emoji>) {
        let map = self.emojis.entry(guild_id).or_default();
        map.clear();
        for emoji in emojis {
            if let Some(id) = emoji.id {
                map.insert(id, emoji);
            }
        }
    }

    // === Voice states ===

    pub fn voice_state(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<VoiceState> {
        self.voice_states
            .get(&guild_id)
            .and_then(|v| v.get(&user_id).map(|s| s.clone()))
    }

    /// Upsert a voice state; a disconnect (null channel) removes the entry
    pub fn put_voice_state(&self, guild_id: Snowflake, voice_state: VoiceState) {
        if voice_state.is_disconnect() {
            if let Some(map) = self.voice_states.get(&guild_id) {
                map.remove(&voice_state.user_id);
            }
        } else {
            self.voice_states
                .entry(guild_id)
                .or_default()
                .insert(voice_state.user_id, voice_state);
        }
    }

    // === Presences ===

    pub fn presence(&self, user_id: Snowflake) -> Option<Presence> {
        self.presences.get(&user_id).map(|p| p.clone())
    }

    pub fn put_presence(&self, presence: Presence) {
        self.presences.insert(presence.user_id(), presence);
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("guilds", &self.guilds.len())
            .field("users", &self.users.len())
            .field("presences", &self.presences.len())
            .finish()
    }
}
