//! Presence entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Partial user reference carried by presence payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub id: Snowflake,
}

/// A user's presence as carried by PRESENCE_UPDATE and guild snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub user: PresenceUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// online, idle, dnd, or offline
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub activities: Vec<serde_json::Value>,
}

impl Presence {
    #[inline]
    pub fn user_id(&self) -> Snowflake {
        self.user.id
    }

    #[inline]
    pub fn is_offline(&self) -> bool {
        self.status == "offline"
    }
}
