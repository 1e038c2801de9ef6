//! Small async utilities

pub mod retry;

pub use retry::await_with_retries;
