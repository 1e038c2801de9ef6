//! Await with timeout and bounded retries
//!
//! Generic wait loop used wherever the gateway waits on something that may
//! stall (member chunks). Each attempt gets a fresh timeout window; the
//! attempt index is passed to the factory so a caller can re-issue the
//! request it is waiting on before later attempts.

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Run `op` until it completes within one `timeout` window, retrying up to
/// `attempts` times in total. Returns the last timeout error when every
/// attempt expires.
///
/// `op` receives the zero-based attempt index.
pub async fn await_with_retries<F, Fut, T>(
    attempts: u32,
    timeout: Duration,
    mut op: F,
) -> Result<T, Elapsed>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
{
    debug_assert!(attempts > 0, "at least one attempt is required");

    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match tokio::time::timeout(timeout, op(attempt)).await {
            Ok(value) => return Ok(value),
            Err(elapsed) => last_err = Some(elapsed),
        }
    }
    Err(last_err.expect("loop ran at least once"))
}
