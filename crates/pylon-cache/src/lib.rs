//! # pylon-cache
//!
//! Concurrent entity cache mutated exclusively by the gateway event
//! pipeline. Reads are safe from any task; writes flow through
//! [`CacheUpdater::apply`] or the bulk-load helpers.

mod store;
mod update;

pub use store::EntityCache;
pub use update::CacheUpdater;
