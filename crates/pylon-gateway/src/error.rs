//! Error types
//!
//! Only failures that cross a public API boundary get a type; transport
//! and protocol failures inside a shard degrade to close-and-requeue and
//! are never surfaced.

use thiserror::Error;

/// REST collaborator errors
#[derive(Debug, Error)]
pub enum RestError {
    /// Request-level failure (connect, TLS, timeout)
    #[error("gateway info request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API
    #[error("gateway info request returned status {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("malformed gateway info response: {0}")]
    Malformed(String),
}

/// Fatal startup errors from the shard manager
#[derive(Debug, Error)]
pub enum StartupError {
    /// The recommended shard count could not be resolved
    #[error("failed to resolve recommended shard count")]
    ShardCount(#[source] RestError),

    /// A zero shard count cannot deploy anything
    #[error("shard count must be greater than zero")]
    ZeroShards,
}

/// Errors querying a shard's debug trace
#[derive(Debug, Error)]
pub enum TraceError {
    /// The shard's command channel is gone
    #[error("shard {0} is not reachable")]
    Unreachable(u16),

    /// No reply within the bounded wait
    #[error("shard {0} did not reply in time")]
    Timeout(u16),
}
