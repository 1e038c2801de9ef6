//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! cargo run -p pylon-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use std::sync::Arc;

use pylon_cache::EntityCache;
use pylon_common::{try_init_tracing, GatewayConfig};
use pylon_gateway::{
    CachingBuffer, GatewayRateLimiter, RestGatewayInfo, SessionRegistry, ShardManager,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    // Run the client
    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting gateway client...");

    // Load configuration
    let config = Arc::new(GatewayConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?);

    info!(
        gateway_url = %config.gateway_url,
        shard_count = ?config.shard_count,
        "Configuration loaded"
    );

    let cache = Arc::new(EntityCache::new());
    let buffer = Arc::new(CachingBuffer::new(Arc::clone(&config), Arc::clone(&cache)));
    let sessions = Arc::new(SessionRegistry::new());
    let limiter = Arc::new(GatewayRateLimiter::new(
        config.outbound_rate,
        config.identify_delay(),
    ));

    let rest = RestGatewayInfo::new(config.rest_url.clone(), config.token.clone());
    let mut manager = ShardManager::new(
        Arc::clone(&config),
        Arc::clone(&buffer),
        sessions,
        limiter,
    );

    let total = manager.start(&rest).await?;
    info!(shards = total, "Fleet deployed");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    manager.shutdown().await;
    Ok(())
}
