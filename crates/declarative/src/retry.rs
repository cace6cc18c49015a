//! Fixed-delay retry for actuation errors.

use crate::error::ActuationError;
use crate::types::RetryPolicy;
use std::thread;

/// Execute an operation with retry logic.
///
/// Retries while the operation returns a retryable error and attempts
/// remain, sleeping `policy.delay` between attempts. `on_retry` receives
/// the failed attempt number (1-indexed) and its error.
pub fn with_retry<T, F, C>(policy: &RetryPolicy, mut on_retry: C, mut operation: F) -> Result<T, ActuationError>
where
    F: FnMut() -> Result<T, ActuationError>,
    C: FnMut(u32, &ActuationError),
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
            Err(e) => {
                on_retry(attempt, &e);
                thread::sleep(policy.delay);
            }
        }
    }
}
