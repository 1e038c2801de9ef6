//! Voice state entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A user's voice connection state within a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// None when the user disconnected from voice
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
}

impl VoiceState {
    /// Whether this state represents a voice disconnect
    #[inline]
    pub fn is_disconnect(&self) -> bool {
        self.channel_id.is_none()
    }
}
