//! Custom emoji entity

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// A guild emoji
///
/// Unicode emoji in reaction payloads have a null `id`; only custom emoji
/// (id present) are cacheable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    #[serde(default)]
    pub id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub managed: bool,
}
