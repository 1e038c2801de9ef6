//! Payload builders for mock gateway frames

use serde_json::{json, Value};

/// HELLO frame (op 10)
pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}})
}

/// Dispatch frame (op 0)
pub fn dispatch(event_type: &str, sequence: u64, data: Value) -> Value {
    json!({"op": 0, "t": event_type, "s": sequence, "d": data})
}

/// READY dispatch body
pub fn ready_body(session_id: &str, guild_ids: &[u64]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({"id": id.to_string(), "unavailable": true}))
        .collect();
    json!({
        "session_id": session_id,
        "user": {"id": "900", "username": "test-bot"},
        "guilds": guilds
    })
}

/// GUILD_CREATE dispatch body
pub fn guild_create_body(guild_id: u64, member_count: u64) -> Value {
    json!({
        "id": guild_id.to_string(),
        "name": format!("guild-{guild_id}"),
        "member_count": member_count,
        "large": member_count > 250
    })
}

/// GUILD_MEMBERS_CHUNK dispatch body with `count` synthetic members
pub fn chunk_body(guild_id: u64, first_member_id: u64, count: u64) -> Value {
    let members: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "user": {
                    "id": (first_member_id + i).to_string(),
                    "username": format!("member-{}", first_member_id + i)
                }
            })
        })
        .collect();
    json!({"guild_id": guild_id.to_string(), "members": members})
}

/// Heartbeat ACK frame (op 11)
pub fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

/// INVALID_SESSION frame (op 9)
pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_body_shape() {
        let body = ready_body("abc", &[1, 2]);
        assert_eq!(body["session_id"], "abc");
        assert_eq!(body["guilds"].as_array().unwrap().len(), 2);
        assert_eq!(body["guilds"][0]["id"], "1");
    }

    #[test]
    fn test_chunk_body_members() {
        let body = chunk_body(42, 1000, 3);
        assert_eq!(body["guild_id"], "42");
        assert_eq!(body["members"].as_array().unwrap().len(), 3);
        assert_eq!(body["members"][2]["user"]["id"], "1002");
    }
}
