//! Cache mutation dispatch
//!
//! Maps each cacheable event type to a handler function through a lookup
//! table, so adding an event type touches exactly one entry and each
//! handler is testable in isolation. Malformed payloads are logged and
//! dropped; the connection is never affected by a bad frame body.

use std::collections::HashMap;

use pylon_core::{
    Channel, Emoji, GatewayEventType, Guild, Member, Presence, Role, Snowflake, User, VoiceState,
};
use serde_json::Value;

use crate::store::EntityCache;

type Handler = fn(&EntityCache, u16, &Value);

/// Event-type → cache-mutation table
pub struct CacheUpdater {
    handlers: HashMap<GatewayEventType, Handler>,
}

impl CacheUpdater {
    /// Build the mutation table for the documented cacheable event set
    #[must_use]
    pub fn new() -> Self {
        use GatewayEventType as E;

        let mut handlers: HashMap<GatewayEventType, Handler> = HashMap::new();
        handlers.insert(E::Ready, ready);
        handlers.insert(E::UserUpdate, user_update);
        handlers.insert(E::GuildCreate, guild_create);
        handlers.insert(E::GuildUpdate, guild_create);
        handlers.insert(E::GuildDelete, guild_delete);
        handlers.insert(E::GuildMemberAdd, member_upsert);
        handlers.insert(E::GuildMemberUpdate, member_upsert);
        handlers.insert(E::GuildMemberRemove, member_remove);
        handlers.insert(E::GuildMembersChunk, members_chunk);
        handlers.insert(E::GuildRoleCreate, role_upsert);
        handlers.insert(E::GuildRoleUpdate, role_upsert);
        handlers.insert(E::GuildRoleDelete, role_delete);
        handlers.insert(E::ChannelCreate, channel_upsert);
        handlers.insert(E::ChannelUpdate, channel_upsert);
        handlers.insert(E::ChannelDelete, channel_delete);
        handlers.insert(E::GuildEmojisUpdate, emojis_update);
        handlers.insert(E::VoiceStateUpdate, voice_state_update);
        handlers.insert(E::PresenceUpdate, presence_update);

        Self { handlers }
    }

    /// Whether the event type mutates the cache
    #[must_use]
    pub fn is_cacheable(&self, event_type: GatewayEventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    /// Apply the mutation for `event_type`; returns false for types with
    /// no cache footprint
    pub fn apply(
        &self,
        cache: &EntityCache,
        event_type: GatewayEventType,
        shard_id: u16,
        payload: &Value,
    ) -> bool {
        match self.handlers.get(&event_type) {
            Some(handler) => {
                handler(cache, shard_id, payload);
                true
            }
            None => false,
        }
    }

    /// Apply by wire name; unknown names have no cache footprint
    pub fn apply_raw(&self, cache: &EntityCache, name: &str, shard_id: u16, payload: &Value) -> bool {
        match GatewayEventType::parse(name) {
            Some(event_type) => self.apply(cache, event_type, shard_id, payload),
            None => false,
        }
    }
}

impl Default for CacheUpdater {
    fn default() -> Self {
        Self::new()
    }
}

// === Payload helpers ===

fn snowflake_field(payload: &Value, field: &str) -> Option<Snowflake> {
    payload.get(field).and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn parse_or_warn<T: serde::de::DeserializeOwned>(
    shard_id: u16,
    event: &str,
    value: &Value,
) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(
                shard_id = %shard_id,
                event = %event,
                error = %e,
                "Dropping malformed cacheable payload"
            );
            None
        }
    }
}

// === Handlers ===

fn ready(cache: &EntityCache, shard_id: u16, payload: &Value) {
    let Some(user_value) = payload.get("user") else {
        tracing::warn!(shard_id = %shard_id, "READY payload missing user");
        return;
    };
    if let Some(user) = parse_or_warn::<User>(shard_id, "READY", user_value) {
        cache.set_current_user(user);
    }
}

fn user_update(cache: &EntityCache, shard_id: u16, payload: &Value) {
    if let Some(user) = parse_or_warn::<User>(shard_id, "USER_UPDATE", payload) {
        cache.set_current_user(user);
    }
}

fn guild_create(cache: &EntityCache, shard_id: u16, payload: &Value) {
    if let Some(guild) = parse_or_warn::<Guild>(shard_id, "GUILD_CREATE", payload) {
        cache.load_guild(guild);
    }
}

fn guild_delete(cache: &EntityCache, _shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "id") else { return };
    // unavailable=true is an outage, not a removal
    if payload.get("unavailable").and_then(Value::as_bool) == Some(true) {
        cache.mark_guild_unavailable(guild_id);
    } else {
        cache.remove_guild(guild_id);
    }
}

fn member_upsert(cache: &EntityCache, shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    if let Some(member) = parse_or_warn::<Member>(shard_id, "GUILD_MEMBER_ADD", payload) {
        cache.put_member(guild_id, member);
    }
}

fn member_remove(cache: &EntityCache, _shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(user_id) = payload
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
    else {
        return;
    };
    cache.remove_member(guild_id, user_id);
}

fn members_chunk(cache: &EntityCache, shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(members_value) = payload.get("members") else { return };
    if let Some(members) =
        parse_or_warn::<Vec<Member>>(shard_id, "GUILD_MEMBERS_CHUNK", members_value)
    {
        cache.load_members(guild_id, members);
    }
}

fn role_upsert(cache: &EntityCache, shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(role_value) = payload.get("role") else { return };
    if let Some(role) = parse_or_warn::<Role>(shard_id, "GUILD_ROLE_CREATE", role_value) {
        cache.put_role(guild_id, role);
    }
}

fn role_delete(cache: &EntityCache, _shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(role_id) = snowflake_field(payload, "role_id") else { return };
    cache.remove_role(guild_id, role_id);
}

fn channel_upsert(cache: &EntityCache, shard_id: u16, payload: &Value) {
    if let Some(channel) = parse_or_warn::<Channel>(shard_id, "CHANNEL_CREATE", payload) {
        // DM channels carry no guild id and are not cached
        if let Some(guild_id) = channel.guild_id {
            cache.put_channel(guild_id, channel);
        }
    }
}

fn channel_delete(cache: &EntityCache, _shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(channel_id) = snowflake_field(payload, "id") else { return };
    cache.remove_channel(guild_id, channel_id);
}

fn emojis_update(cache: &EntityCache, shard_id: u16, payload: &Value) {
    let Some(guild_id) = snowflake_field(payload, "guild_id") else { return };
    let Some(emojis_value) = payload.get("emojis") else { return };
    if let Some(emojis) = parse_or_warn::<Vec<Emoji>>(shard_id, "GUILD_EMOJIS_UPDATE", emojis_value)
    {
        cache.replace_emojis(guild_id, emojis);
    }
}

fn voice_state_update(cache: &EntityCache, shard_id: u16, payload: &Value) {
    if let Some(voice_state) = parse_or_warn::<VoiceState>(shard_id, "VOICE_STATE_UPDATE", payload)
    {
        if let Some(guild_id) = voice_state.guild_id {
            cache.put_voice_state(guild_id, voice_state);
        }
    }
}

fn presence_update(cache: &EntityCache, shard_id: u16, payload: &Value) {
    if let Some(presence) = parse_or_warn::<Presence>(shard_id, "PRESENCE_UPDATE", payload) {
        cache.put_presence(presence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(cache: &EntityCache, updater: &CacheUpdater, name: &str, payload: Value) -> bool {
        updater.apply_raw(cache, name, 0, &payload)
    }

    #[test]
    fn test_cacheable_set() {
        let updater = CacheUpdater::new();
        assert!(updater.is_cacheable(GatewayEventType::Ready));
        assert!(updater.is_cacheable(GatewayEventType::GuildMembersChunk));
        assert!(updater.is_cacheable(GatewayEventType::PresenceUpdate));
        assert!(!updater.is_cacheable(GatewayEventType::Resumed));
    }

    #[test]
    fn test_unknown_event_has_no_footprint() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();
        assert!(!apply(&cache, &updater, "MESSAGE_CREATE", json!({"id": "1"})));
    }

    #[test]
    fn test_ready_caches_current_user() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();

        apply(
            &cache,
            &updater,
            "READY",
            json!({"session_id": "abc", "user": {"id": "9", "username": "me"}, "guilds": []}),
        );
        assert_eq!(cache.current_user().unwrap().id, Snowflake::new(9));
    }

    #[test]
    fn test_guild_create_then_delete() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();

        apply(
            &cache,
            &updater,
            "GUILD_CREATE",
            json!({"id": "100", "name": "g", "member_count": 1}),
        );
        assert!(cache.guild(Snowflake::new(100)).is_some());

        apply(&cache, &updater, "GUILD_DELETE", json!({"id": "100"}));
        assert!(cache.guild(Snowflake::new(100)).is_none());
    }

    #[test]
    fn test_guild_delete_unavailable_keeps_guild() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();

        apply(&cache, &updater, "GUILD_CREATE", json!({"id": "100", "name": "g"}));
        apply(
            &cache,
            &updater,
            "GUILD_DELETE",
            json!({"id": "100", "unavailable": true}),
        );

        assert!(cache.guild(Snowflake::new(100)).unwrap().unavailable);
    }

    #[test]
    fn test_member_add_update_remove() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();
        let gid = Snowflake::new(100);
        let uid = Snowflake::new(9);

        apply(
            &cache,
            &updater,
            "GUILD_MEMBER_ADD",
            json!({"guild_id": "100", "user": {"id": "9", "username": "a"}, "roles": []}),
        );
        assert!(cache.member(gid, uid).is_some());

        apply(
            &cache,
            &updater,
            "GUILD_MEMBER_UPDATE",
            json!({"guild_id": "100", "user": {"id": "9", "username": "a"}, "nick": "renamed"}),
        );
        assert_eq!(cache.member(gid, uid).unwrap().nick.as_deref(), Some("renamed"));

        apply(
            &cache,
            &updater,
            "GUILD_MEMBER_REMOVE",
            json!({"guild_id": "100", "user": {"id": "9"}}),
        );
        assert!(cache.member(gid, uid).is_none());
    }

    #[test]
    fn test_members_chunk_bulk_load() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();

        apply(
            &cache,
            &updater,
            "GUILD_MEMBERS_CHUNK",
            json!({
                "guild_id": "100",
                "members": [
                    {"user": {"id": "1", "username": "a"}},
                    {"user": {"id": "2", "username": "b"}}
                ]
            }),
        );
        assert_eq!(cache.member_count(Snowflake::new(100)), 2);
    }

    #[test]
    fn test_role_lifecycle() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();
        let gid = Snowflake::new(100);

        apply(
            &cache,
            &updater,
            "GUILD_ROLE_CREATE",
            json!({"guild_id": "100", "role": {"id": "5", "name": "mods"}}),
        );
        assert!(cache.role(gid, Snowflake::new(5)).is_some());

        apply(
            &cache,
            &updater,
            "GUILD_ROLE_DELETE",
            json!({"guild_id": "100", "role_id": "5"}),
        );
        assert!(cache.role(gid, Snowflake::new(5)).is_none());
    }

    #[test]
    fn test_malformed_payload_is_dropped() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();

        // `role` is not an object; handler must not panic or cache anything
        apply(
            &cache,
            &updater,
            "GUILD_ROLE_CREATE",
            json!({"guild_id": "100", "role": "not-an-object"}),
        );
        assert!(cache.role(Snowflake::new(100), Snowflake::new(5)).is_none());
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let cache = EntityCache::new();
        let updater = CacheUpdater::new();
        let payload = json!({"id": "100", "name": "g", "members": [{"user": {"id": "1", "username": "a"}}]});

        apply(&cache, &updater, "GUILD_CREATE", payload.clone());
        apply(&cache, &updater, "GUILD_CREATE", payload);

        assert_eq!(cache.guild_count(), 1);
        assert_eq!(cache.member_count(Snowflake::new(100)), 1);
    }
}
