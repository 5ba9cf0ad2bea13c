/// Bounded retry for read-after-write visibility
///
/// A just-created output may take one propagation cycle to show up in the
/// tracked-output listing. Lookups are retried a fixed number of times with a
/// fixed delay; there is no unbounded wait.
use crate::error::DidResult;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

/// Attempts allowed for the issuance output to become visible.
pub const VISIBILITY_ATTEMPTS: u32 = 3;

/// Delay between visibility lookups.
pub const VISIBILITY_DELAY_MS: u64 = 500;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(VISIBILITY_ATTEMPTS, Duration::from_millis(VISIBILITY_DELAY_MS))
    }
}

/// Run `lookup` until it yields `Some`, at most `policy.attempts` times.
///
/// Sleeps `policy.delay` between attempts (not after the last one). Lookup
/// errors are logged and count as a miss. Returns `None` when every attempt
/// missed.
pub async fn retry_until<T, F, Fut>(policy: RetryPolicy, mut lookup: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DidResult<Option<T>>>,
{
    for attempt in 1..=policy.attempts {
        match lookup().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => debug!(attempt, max_attempts = policy.attempts, "output not yet visible"),
            Err(e) => warn!(
                attempt,
                max_attempts = policy.attempts,
                error = %e,
                "visibility lookup failed"
            ),
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DidError;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_first_hit() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retry_until(RetryPolicy::default(), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n == 2 { Some(n) } else { None })
            }
        })
        .await;

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_attempts_with_fixed_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = tokio::time::Instant::now();

        let result: Option<()> = retry_until(RetryPolicy::default(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), VISIBILITY_ATTEMPTS);
        // two sleeps between three attempts
        assert_eq!(
            started.elapsed(),
            Duration::from_millis(VISIBILITY_DELAY_MS * 2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_treats_errors_as_misses() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retry_until(RetryPolicy::new(3, Duration::from_millis(10)), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(DidError::Chain("listing unavailable".into()))
                } else {
                    Ok(Some("visible"))
                }
            }
        })
        .await;

        assert_eq!(result, Some("visible"));
    }
}
