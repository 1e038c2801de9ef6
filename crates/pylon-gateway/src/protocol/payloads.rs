//! Gateway payload definitions
//!
//! Bodies for the frames this client sends (Identify, Resume, member-chunk
//! requests) and the server frames it must parse (Hello, Ready).

use pylon_core::{Snowflake, UnavailableGuild, User};
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// First frame the server sends after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,

    /// Gateway debug trace, when the server provides one
    #[serde(default, rename = "_trace")]
    pub trace: Vec<String>,
}

/// Client identification properties sent with Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ConnectionProperties {
    /// Properties describing this library
    #[must_use]
    pub fn library() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "pylon".to_string(),
            device: "pylon".to_string(),
        }
    }
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self::library()
    }
}

/// Payload for op 2 (Identify)
///
/// Opens a brand-new session for one shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub properties: ConnectionProperties,
    /// `[shard_id, total_shards]`
    pub shard: [u16; 2],
    pub large_threshold: u32,
    pub compress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<serde_json::Value>,
}

impl IdentifyPayload {
    #[must_use]
    pub fn new(token: impl Into<String>, shard_id: u16, total_shards: u16) -> Self {
        Self {
            token: token.into(),
            properties: ConnectionProperties::library(),
            shard: [shard_id, total_shards],
            large_threshold: 250,
            compress: false,
            presence: None,
        }
    }

    #[must_use]
    pub fn with_large_threshold(mut self, large_threshold: u32) -> Self {
        self.large_threshold = large_threshold;
        self
    }

    #[must_use]
    pub fn with_presence(mut self, presence: Option<serde_json::Value>) -> Self {
        self.presence = presence;
        self
    }
}

/// Payload for op 6 (Resume)
///
/// Reattaches to a prior session via stored session id and sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    pub guild_id: Snowflake,
    /// Empty query matches every member
    pub query: String,
    /// 0 removes the result cap
    pub limit: u32,
}

impl RequestGuildMembersPayload {
    /// Request every member of a guild
    #[must_use]
    pub fn all(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            query: String::new(),
            limit: 0,
        }
    }
}

/// Body of the READY dispatch event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user: User,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    #[serde(default, rename = "_trace")]
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_payload_parse() {
        let hello: HelloPayload =
            serde_json::from_str(r#"{"heartbeat_interval":41250,"_trace":["gw-17"]}"#).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
        assert_eq!(hello.trace, vec!["gw-17".to_string()]);

        let bare: HelloPayload = serde_json::from_str(r#"{"heartbeat_interval":45000}"#).unwrap();
        assert!(bare.trace.is_empty());
    }

    #[test]
    fn test_identify_payload_serialization() {
        let payload = IdentifyPayload::new("token123", 3, 16)
            .with_large_threshold(250)
            .with_presence(Some(serde_json::json!({"status": "online"})));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["token"], "token123");
        assert_eq!(json["shard"][0], 3);
        assert_eq!(json["shard"][1], 16);
        assert_eq!(json["large_threshold"], 250);
        assert_eq!(json["compress"], false);
        assert_eq!(json["presence"]["status"], "online");
    }

    #[test]
    fn test_identify_omits_absent_presence() {
        let payload = IdentifyPayload::new("t", 0, 1);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("presence"));
    }

    #[test]
    fn test_resume_payload_serialization() {
        let payload = ResumePayload {
            token: "token123".to_string(),
            session_id: "session456".to_string(),
            seq: 42,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["session_id"], "session456");
        assert_eq!(json["seq"], 42);
    }

    #[test]
    fn test_request_guild_members_all() {
        let payload = RequestGuildMembersPayload::all(Snowflake::new(42));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["guild_id"], "42");
        assert_eq!(json["query"], "");
        assert_eq!(json["limit"], 0);
    }

    #[test]
    fn test_ready_payload_parse() {
        let ready: ReadyPayload = serde_json::from_str(
            r#"{
                "session_id": "abc",
                "user": {"id": "9", "username": "me"},
                "guilds": [{"id": "100", "unavailable": true}]
            }"#,
        )
        .unwrap();
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.guilds.len(), 1);
        assert!(ready.guilds[0].unavailable);
    }
}
