//! # pylon-core
//!
//! Domain layer containing the snowflake value object, wire entity DTOs,
//! and the gateway event-type table. This crate has zero dependencies on
//! networking or runtime infrastructure.

pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Channel, Emoji, Guild, Member, Presence, PresenceUser, Role, UnavailableGuild, User,
    VoiceState,
};
pub use events::GatewayEventType;
pub use value_objects::{Snowflake, SnowflakeParseError};
