//! Shard - one gateway connection and its protocol state machine

mod commands;
mod runner;
mod state;

pub use commands::{ShardMessenger, StartState};
pub use state::{ConnectionPhase, ShardState};

pub(crate) use commands::ShardCommand;
pub(crate) use runner::ShardRunner;
