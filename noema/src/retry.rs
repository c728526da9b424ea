//! Exponential backoff for retried dispatch attempts.
//!
//! No backoff crate appears anywhere in the corpus this crate is grounded
//! on, so the formula from the specification (base 0.5s, factor 2x, max
//! 5s, +/-20% jitter) is hand-rolled here using `tokio::time::sleep` and
//! `fastrand`, both already-present dependencies.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

const BASE: Duration = Duration::from_millis(500);
const MAX: Duration = Duration::from_secs(5);
const FACTOR: u32 = 2;
const JITTER: f64 = 0.2;

/// Backoff delay for the given 0-based attempt number, with jitter.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = FACTOR.saturating_pow(attempt);
    let scaled = BASE.saturating_mul(exp).min(MAX);
    let jitter_span = scaled.as_secs_f64() * JITTER;
    let jitter = (fastrand::f64() * 2.0 - 1.0) * jitter_span;
    let secs = (scaled.as_secs_f64() + jitter).max(0.0);
    Duration::from_secs_f64(secs)
}

/// Retry `attempt_fn` up to `max_retries` additional times (so
/// `max_retries + 1` attempts total), sleeping with [`backoff_delay`]
/// between attempts. `is_terminal` short-circuits retries for errors that
/// would not be helped by retrying (invalid input, auth failure).
pub async fn with_retry<T, E, F, Fut>(
    max_retries: u32,
    is_terminal: impl Fn(&E) -> bool,
    mut attempt_fn: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_retries || is_terminal(&err) => return Err(err),
            Err(err) => {
                warn!(attempt, "dispatch attempt failed, retrying");
                drop(err);
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}
