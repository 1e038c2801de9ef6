//! REST collaborator
//!
//! The gateway client needs exactly one REST call: the recommended shard
//! count, fetched once at startup when no count is configured. The trait
//! seam keeps the full REST client out of scope and lets tests substitute
//! a stub.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RestError;

/// Source of gateway connection metadata
#[async_trait]
pub trait GatewayInfoProvider: Send + Sync {
    /// Recommended number of shards for this token
    async fn recommended_shards(&self) -> Result<u16, RestError>;
}

#[derive(Debug, Deserialize)]
struct GatewayBotResponse {
    shards: u16,
}

/// HTTP-backed implementation against `GET {rest_url}/gateway/bot`
pub struct RestGatewayInfo {
    http: reqwest::Client,
    rest_url: String,
    token: String,
}

impl RestGatewayInfo {
    #[must_use]
    pub fn new(rest_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_url: rest_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl GatewayInfoProvider for RestGatewayInfo {
    async fn recommended_shards(&self) -> Result<u16, RestError> {
        let url = format!("{}/gateway/bot", self.rest_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status(status.as_u16()));
        }

        let body: GatewayBotResponse = response
            .json()
            .await
            .map_err(|e| RestError::Malformed(e.to_string()))?;

        tracing::info!(shards = body.shards, "Resolved recommended shard count");
        Ok(body.shards)
    }
}

impl std::fmt::Debug for RestGatewayInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGatewayInfo")
            .field("rest_url", &self.rest_url)
            .finish()
    }
}
