//! Events published to subscribers

use serde_json::Value;

/// One dispatch event, as released by the caching buffer
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Shard the event arrived on
    pub shard_id: u16,
    /// Wire event name (`t` field), e.g. `GUILD_CREATE`
    pub kind: String,
    /// Sequence number, when the frame carried one
    pub sequence: Option<u64>,
    /// Raw event body
    pub payload: Value,
}

impl DispatchEvent {
    /// Guild id referenced by the body, when present
    ///
    /// GUILD_CREATE/UPDATE/DELETE carry the id at `d.id`; every other
    /// guild-scoped event carries `d.guild_id`.
    pub fn guild_id(&self) -> Option<pylon_core::Snowflake> {
        let field = match self.kind.as_str() {
            "GUILD_CREATE" | "GUILD_UPDATE" | "GUILD_DELETE" => "id",
            _ => "guild_id",
        };
        self.payload
            .get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Everything a subscriber can observe
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A dispatch event released in cache-consistent order
    Dispatch(DispatchEvent),
    /// Every shard's buffers drained: the initial fleet-wide guild load
    /// (including member chunking) is complete
    ChunkingComplete,
}
