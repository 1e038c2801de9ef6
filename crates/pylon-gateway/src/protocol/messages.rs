//! Gateway frame format
//!
//! All traffic on the socket is a JSON text frame of this shape.

use super::{
    HelloPayload, IdentifyPayload, OpCode, RequestGuildMembersPayload, ResumePayload,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame `{op, d, s?, t?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Frame body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    // === Client frames ===

    /// Create an Identify frame (op=2)
    #[must_use]
    pub fn identify(payload: IdentifyPayload) -> Self {
        Self::body(OpCode::Identify, serde_json::to_value(payload).unwrap_or_default())
    }

    /// Create a Resume frame (op=6)
    #[must_use]
    pub fn resume(payload: ResumePayload) -> Self {
        Self::body(OpCode::Resume, serde_json::to_value(payload).unwrap_or_default())
    }

    /// Create a Heartbeat frame (op=1) carrying the last seen sequence,
    /// `null` before any dispatch has been received
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            t: None,
            s: None,
            d: Some(last_sequence.map_or(Value::Null, |s| Value::Number(s.into()))),
        }
    }

    /// Create a Request Guild Members frame (op=8)
    #[must_use]
    pub fn request_guild_members(payload: RequestGuildMembersPayload) -> Self {
        Self::body(
            OpCode::RequestGuildMembers,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    fn body(op: OpCode, d: Value) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d: Some(d),
        }
    }

    // === Parsing server frames ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Read the resumable flag of an Invalid Session frame (op=9)
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Event type of a dispatch frame (op=0)
    pub fn event_type(&self) -> Option<&str> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        self.t.as_deref()
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
