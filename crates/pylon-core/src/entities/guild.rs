//! Guild entity - a server and the collections bundled in its snapshot

use serde::{Deserialize, Serialize};

use crate::entities::{Channel, Emoji, Member, Presence, Role, VoiceState};
use crate::value_objects::Snowflake;

/// Guild snapshot as carried by GUILD_CREATE / GUILD_UPDATE
///
/// The nested collections are only populated on the initial GUILD_CREATE
/// snapshot; the cache drains them into its per-guild stores on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub large: bool,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
    #[serde(default)]
    pub presences: Vec<Presence>,
}

impl Guild {
    /// Check if a user is the guild owner
    #[inline]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id == Some(user_id)
    }

    /// Member count reported by the snapshot, 0 when absent
    #[inline]
    pub fn reported_members(&self) -> u64 {
        self.member_count.unwrap_or(0)
    }
}

/// Guild placeholder from the READY guild list
///
/// READY advertises every guild the session will receive, available or not;
/// the full snapshot arrives later as a GUILD_CREATE per guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}
