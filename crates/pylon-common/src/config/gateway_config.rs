//! Gateway client configuration
//!
//! Loads configuration from environment variables; a `.env` file is honored
//! when present.

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Configuration for the gateway client fleet
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Bot authentication token, sent in IDENTIFY/RESUME and REST calls
    pub token: String,

    /// WebSocket URL of the gateway
    pub gateway_url: String,

    /// Base URL of the REST API (recommended shard count lookup)
    pub rest_url: String,

    /// Number of shards to deploy; `None` resolves the recommended count
    /// from the REST API at startup
    #[serde(default)]
    pub shard_count: Option<u16>,

    /// Member count above which a guild is "large" and requires chunking
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,

    /// Whether to request member chunks for large guilds
    #[serde(default = "default_member_chunking")]
    pub member_chunking: bool,

    /// How long to wait for a guild's member chunks before retrying
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,

    /// Minimum delay between two identify completions across the fleet
    #[serde(default = "default_identify_delay_ms")]
    pub identify_delay_ms: u64,

    /// Connect-queue re-poll delay when the queue is empty
    #[serde(default = "default_queue_poll_ms")]
    pub queue_poll_ms: u64,

    /// Upper bound on a shard's START handshake reply
    #[serde(default = "default_start_reply_timeout_ms")]
    pub start_reply_timeout_ms: u64,

    /// Outbound frame budget per shard per 60 seconds
    #[serde(default = "default_outbound_rate")]
    pub outbound_rate: u32,

    /// Capacity of the subscriber broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Initial presence block sent with IDENTIFY
    #[serde(default)]
    pub presence: Option<serde_json::Value>,
}

// Default value functions
fn default_large_threshold() -> u32 {
    250
}

fn default_member_chunking() -> bool {
    true
}

fn default_chunk_timeout_ms() -> u64 {
    10_000
}

fn default_identify_delay_ms() -> u64 {
    5_000
}

fn default_queue_poll_ms() -> u64 {
    1_000
}

fn default_start_reply_timeout_ms() -> u64 {
    30_000
}

fn default_outbound_rate() -> u32 {
    120
}

fn default_event_buffer() -> usize {
    1024
}

impl GatewayConfig {
    /// Create a configuration with defaults for everything but the
    /// endpoints and token
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        gateway_url: impl Into<String>,
        rest_url: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            gateway_url: gateway_url.into(),
            rest_url: rest_url.into(),
            shard_count: None,
            large_threshold: default_large_threshold(),
            member_chunking: default_member_chunking(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            identify_delay_ms: default_identify_delay_ms(),
            queue_poll_ms: default_queue_poll_ms(),
            start_reply_timeout_ms: default_start_reply_timeout_ms(),
            outbound_rate: default_outbound_rate(),
            event_buffer: default_event_buffer(),
            presence: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    /// or unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let shard_count = match env::var("SHARD_COUNT") {
            Ok(v) if v.eq_ignore_ascii_case("auto") => None,
            Ok(v) => Some(
                v.parse::<u16>()
                    .map_err(|_| ConfigError::InvalidValue("SHARD_COUNT", v))?,
            ),
            Err(_) => None,
        };

        let presence = match env::var("PRESENCE") {
            Ok(v) => Some(
                serde_json::from_str(&v)
                    .map_err(|_| ConfigError::InvalidValue("PRESENCE", v))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            token: env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingVar("BOT_TOKEN"))?,
            gateway_url: env::var("GATEWAY_URL")
                .map_err(|_| ConfigError::MissingVar("GATEWAY_URL"))?,
            rest_url: env::var("REST_URL").map_err(|_| ConfigError::MissingVar("REST_URL"))?,
            shard_count,
            large_threshold: parse_or("LARGE_THRESHOLD", default_large_threshold()),
            member_chunking: parse_or("MEMBER_CHUNKING", default_member_chunking()),
            chunk_timeout_ms: parse_or("CHUNK_TIMEOUT_MS", default_chunk_timeout_ms()),
            identify_delay_ms: parse_or("IDENTIFY_DELAY_MS", default_identify_delay_ms()),
            queue_poll_ms: parse_or("QUEUE_POLL_MS", default_queue_poll_ms()),
            start_reply_timeout_ms: parse_or(
                "START_REPLY_TIMEOUT_MS",
                default_start_reply_timeout_ms(),
            ),
            outbound_rate: parse_or("OUTBOUND_RATE", default_outbound_rate()),
            event_buffer: parse_or("EVENT_BUFFER", default_event_buffer()),
            presence,
        })
    }

    /// Minimum delay between fleet identify completions
    #[must_use]
    pub fn identify_delay(&self) -> Duration {
        Duration::from_millis(self.identify_delay_ms)
    }

    /// Member-chunk wait window
    #[must_use]
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    /// Empty-queue re-poll delay
    #[must_use]
    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    /// Bound on the START handshake reply
    #[must_use]
    pub fn start_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.start_reply_timeout_ms)
    }
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_large_threshold(), 250);
        assert!(default_member_chunking());
        assert_eq!(default_chunk_timeout_ms(), 10_000);
        assert_eq!(default_identify_delay_ms(), 5_000);
        assert_eq!(default_queue_poll_ms(), 1_000);
        assert_eq!(default_outbound_rate(), 120);
    }

    #[test]
    fn test_new_applies_defaults() {
        let config = GatewayConfig::new("token", "wss://gw.example", "https://api.example");
        assert_eq!(config.token, "token");
        assert!(config.shard_count.is_none());
        assert_eq!(config.large_threshold, 250);
        assert!(config.member_chunking);
        assert_eq!(config.identify_delay(), Duration::from_secs(5));
        assert_eq!(config.queue_poll(), Duration::from_secs(1));
    }

    #[test]
    fn test_duration_accessors() {
        let mut config = GatewayConfig::new("t", "wss://gw", "https://api");
        config.chunk_timeout_ms = 250;
        config.start_reply_timeout_ms = 1500;
        assert_eq!(config.chunk_timeout(), Duration::from_millis(250));
        assert_eq!(config.start_reply_timeout(), Duration::from_millis(1500));
    }
}
