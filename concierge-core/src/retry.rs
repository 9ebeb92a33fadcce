//! A single retry helper parameterized by `{bounds, max_attempts |
//! max_duration, classify_terminal}`, shared by every retry site in the
//! system: `Worker::run_with_retries`, the Snapd client, and the
//! controller's existence probe / bootstrap (spec §9 "Backoff policy").
//! Classification inspects the raw error, not its type, because the same
//! transport failure is retriable in one context and terminal in another.

use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::{ConciergeError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryBounds {
    pub min: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Copy)]
pub enum RetryLimit {
    MaxDuration(Duration),
    MaxAttempts(u32),
}

/// Retry `attempt` under exponential backoff bounded by `bounds`, stopping
/// once `limit` is reached or `classify_terminal` says the last error
/// should not be retried. The last observed error is returned unchanged on
/// give-up, matching `run_with_retries`'s "last attempt's exception is
/// re-raised" contract.
pub async fn retry<T, Fut>(
    bounds: RetryBounds,
    limit: RetryLimit,
    classify_terminal: impl Fn(&ConciergeError) -> bool,
    mut attempt: impl FnMut() -> Fut,
) -> Result<T>
where
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff {
        current_interval: bounds.min,
        initial_interval: bounds.min,
        max_interval: bounds.max,
        max_elapsed_time: match limit {
            RetryLimit::MaxDuration(d) => Some(d),
            RetryLimit::MaxAttempts(_) => None,
        },
        start_time: Instant::now(),
        ..ExponentialBackoff::default()
    };

    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if classify_terminal(&err) {
                    return Err(err);
                }

                let attempts_exhausted = matches!(limit, RetryLimit::MaxAttempts(n) if attempts >= n);
                if attempts_exhausted {
                    return Err(err);
                }

                match backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(err),
                }
            }
        }
    }
}

/// Never treat anything as terminal; used by sites where every failure is
/// retriable (e.g. `Worker::run_with_retries`).
pub fn never_terminal(_: &ConciergeError) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(
            RetryBounds { min: Duration::from_millis(1), max: Duration::from_millis(2) },
            RetryLimit::MaxAttempts(3),
            never_terminal,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConciergeError::Internal("nope".into())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_classification_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(
            RetryBounds { min: Duration::from_millis(1), max: Duration::from_millis(2) },
            RetryLimit::MaxAttempts(10),
            |e| e.to_string().contains("permanent"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConciergeError::Internal("permanent failure".into())) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retrying_on_first_ok() {
        let calls = AtomicU32::new(0);
        let result = retry(
            RetryBounds { min: Duration::from_millis(1), max: Duration::from_millis(2) },
            RetryLimit::MaxAttempts(5),
            never_terminal,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ConciergeError>(42) }
            },
        )
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
