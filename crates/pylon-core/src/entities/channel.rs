//! Channel entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A guild channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    /// Numeric channel kind from the wire (text, voice, category, ...)
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub nsfw: bool,
}

impl Channel {
    /// Wire value for a guild text channel
    pub const TEXT: u8 = 0;
    /// Wire value for a guild voice channel
    pub const VOICE: u8 = 2;
    /// Wire value for a channel category
    pub const CATEGORY: u8 = 4;

    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind == Self::TEXT
    }

    #[inline]
    pub fn is_voice(&self) -> bool {
        self.kind == Self::VOICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_deserialize() {
        let channel: Channel = serde_json::from_str(
            r#"{"id":"10","type":0,"guild_id":"100","name":"general","position":1}"#,
        )
        .unwrap();
        assert_eq!(channel.id, Snowflake::new(10));
        assert!(channel.is_text());
        assert!(!channel.is_voice());
        assert_eq!(channel.guild_id, Some(Snowflake::new(100)));
    }
}
