//! User entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A user as transmitted by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Display tag, `name#discriminator` when a discriminator is present
    pub fn tag(&self) -> String {
        match &self.discriminator {
            Some(d) => format!("{}#{}", self.username, d),
            None => self.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserialize_minimal() {
        let user: User = serde_json::from_str(r#"{"id":"42","username":"quokka"}"#).unwrap();
        assert_eq!(user.id, Snowflake::new(42));
        assert_eq!(user.username, "quokka");
        assert!(!user.bot);
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_user_tag() {
        let user: User =
            serde_json::from_str(r#"{"id":"1","username":"quokka","discriminator":"0001"}"#)
                .unwrap();
        assert_eq!(user.tag(), "quokka#0001");
    }
}
