//! Timeout-based polling

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = std::result::Result<Option<T>, String>;

/// Why a wait ended without a value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitError {
    /// Deadline elapsed before the condition was met
    TimedOut,
    /// Cancellation token fired
    Cancelled,
    /// Check function reported a fatal error
    Failed(String),
}

/// Poll a condition at regular intervals until it yields a value.
///
/// Stops when:
/// - The condition returns `Ok(Some(value))` - returns `Ok(value)`
/// - The timeout is exceeded - returns `WaitError::TimedOut`
/// - `cancel` fires - returns `WaitError::Cancelled`
/// - The condition returns `Err` - returns `WaitError::Failed` immediately
///
/// A zero `interval` polls back to back, which keeps test suites fast.
pub async fn wait_with_timeout<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    description: &str,
    cancel: &CancellationToken,
    mut check_fn: F,
) -> std::result::Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let start = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        if start.elapsed() > timeout {
            return Err(WaitError::TimedOut);
        }

        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!("Waiting for {}...", description);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(WaitError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(e) => return Err(WaitError::Failed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_value_once_condition_is_met() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = wait_with_timeout(
            Duration::from_secs(5),
            Duration::ZERO,
            "third call",
            &CancellationToken::new(),
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 3 {
                        Ok(Some(n))
                    } else {
                        Ok(None)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_when_condition_never_holds() {
        let result: Result<(), _> = wait_with_timeout(
            Duration::from_millis(20),
            Duration::from_millis(1),
            "never",
            &CancellationToken::new(),
            || async { Ok(None) },
        )
        .await;
        assert_eq!(result, Err(WaitError::TimedOut));
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let result: Result<(), _> = wait_with_timeout(
            Duration::from_secs(5),
            Duration::ZERO,
            "broken",
            &CancellationToken::new(),
            || async { Err("boom".to_string()) },
        )
        .await;
        assert_eq!(result, Err(WaitError::Failed("boom".to_string())));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = wait_with_timeout(
            Duration::from_secs(30),
            Duration::from_secs(10),
            "cancelled wait",
            &cancel,
            || async { Ok(None) },
        )
        .await;
        assert_eq!(result, Err(WaitError::Cancelled));
    }
}
