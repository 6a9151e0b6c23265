//! Exponential backoff for transient network failures (spec §4.C / §6).
//!
//! Grounded on the teacher's `retry.rs`: capped exponential backoff with a
//! fixed attempt budget, retrying only on the caller-chosen predicate so
//! auth/validation failures fail fast instead of being retried uselessly.
use std::time::Duration;

use tracing::warn;

const BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Run `op`, retrying up to `max_attempts` times (including the first) with
/// capped exponential backoff between tries, as long as `is_retryable`
/// returns `true` for the error produced.
pub async fn with_backoff<T, E, F, Fut, R>(
    max_attempts: u32,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = backoff_delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BASE_DELAY.saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX));
    scaled.min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(
            3,
            |_: &&str| true,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_when_predicate_rejects() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(
            5,
            |_: &&str| false,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
