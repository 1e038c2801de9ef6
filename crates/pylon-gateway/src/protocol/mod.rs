//! Gateway wire protocol
//!
//! JSON frames `{op, d, s?, t?}` and the payload bodies this client sends
//! and receives.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    ConnectionProperties, HelloPayload, IdentifyPayload, ReadyPayload, RequestGuildMembersPayload,
    ResumePayload,
};
