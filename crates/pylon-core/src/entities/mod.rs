//! Wire entities - payload shapes received from the gateway
//!
//! These are deserialization targets for dispatch payloads, not database
//! rows: every field the server may omit carries `#[serde(default)]` or an
//! `Option`, and unknown fields are ignored.

mod channel;
mod emoji;
mod guild;
mod member;
mod presence;
mod role;
mod user;
mod voice_state;

pub use channel::Channel;
pub use emoji::Emoji;
pub use guild::{Guild, UnavailableGuild};
pub use member::Member;
pub use presence::{Presence, PresenceUser};
pub use role::Role;
pub use user::User;
pub use voice_state::VoiceState;
