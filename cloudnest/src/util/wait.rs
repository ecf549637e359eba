//! Condition polling.

use cloudnest_shared::errors::{ProvisionError, ProvisionResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Poll `predicate` until it returns `true` or `timeout` elapses.
///
/// Returns as soon as the predicate holds, without sleeping. An `Err` from the
/// predicate is returned immediately and is never treated as "not ready".
/// On expiry the error is `ProvisionError::Timeout`. A predicate evaluation
/// still pending at the deadline is dropped and counts as not ready.
pub async fn wait_for<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> ProvisionResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProvisionResult<bool>>,
{
    if timeout.is_zero() || poll_interval.is_zero() {
        return Err(ProvisionError::InvalidInput(
            "timeout and poll interval must be positive".into(),
        ));
    }
    if poll_interval >= timeout {
        return Err(ProvisionError::InvalidInput(format!(
            "poll interval ({}ms) must be shorter than timeout ({}ms)",
            poll_interval.as_millis(),
            timeout.as_millis()
        )));
    }

    let start = Instant::now();
    let deadline = start + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let ready = match tokio::time::timeout(remaining, predicate()).await {
            Ok(result) => result?,
            Err(_) => false,
        };
        if ready {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProvisionError::Timeout {
                elapsed_ms: elapsed.as_millis(),
                last_result: ready,
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Suspend for `duration`.
pub async fn wait(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Parse a millisecond count supplied as text.
pub fn parse_millis(raw: &str) -> ProvisionResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ProvisionError::InvalidInput(format!("milliseconds not a number: `{raw}`")))
}
