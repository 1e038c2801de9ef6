//! Guild member entity

use serde::{Deserialize, Serialize};

use crate::entities::User;
use crate::value_objects::Snowflake;

/// A member of a guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// The user this membership belongs to; absent in some partial payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
}

impl Member {
    /// The member's user id, when the payload carries the user object
    #[inline]
    pub fn user_id(&self) -> Option<Snowflake> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Effective display name: nickname if set, username otherwise
    pub fn display_name(&self) -> Option<&str> {
        self.nick
            .as_deref()
            .or_else(|| self.user.as_ref().map(|u| u.username.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_deserialize() {
        let member: Member = serde_json::from_str(
            r#"{
                "user": {"id": "9", "username": "quokka"},
                "nick": "Q",
                "roles": ["1", "2"]
            }"#,
        )
        .unwrap();

        assert_eq!(member.user_id(), Some(Snowflake::new(9)));
        assert_eq!(member.display_name(), Some("Q"));
        assert_eq!(member.roles.len(), 2);
    }

    #[test]
    fn test_member_display_name_falls_back_to_username() {
        let member: Member =
            serde_json::from_str(r#"{"user": {"id": "9", "username": "quokka"}}"#).unwrap();
        assert_eq!(member.display_name(), Some("quokka"));
    }
}
