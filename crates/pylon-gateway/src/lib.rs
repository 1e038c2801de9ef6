//! # pylon-gateway
//!
//! Client side of the sharded real-time gateway: per-connection protocol
//! state machines, fleet-wide connect orchestration, and the event buffer
//! that keeps the entity cache consistent before anything reaches
//! subscribers.

pub mod buffer;
pub mod error;
pub mod events;
pub mod limiter;
pub mod manager;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod shard;
pub mod util;

pub use buffer::CachingBuffer;
pub use error::{RestError, StartupError, TraceError};
pub use events::{DispatchEvent, GatewayEvent};
pub use limiter::GatewayRateLimiter;
pub use manager::ShardManager;
pub use rest::{GatewayInfoProvider, RestGatewayInfo};
pub use session::{SessionData, SessionRegistry};
pub use shard::StartState;
