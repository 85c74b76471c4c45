//! Opt-in retry of timed-out sequences.
//
// Sequences never retry on their own: a second actuation is a second
// hardware command, so the caller decides. Only `Timeout` is retried; a
// validation failure or a device fault would fail the same way again.

use crate::error::{BeamlineError, BeamlineResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

/// Run `operation`, re-running it after a `Timeout` up to the policy's limit.
///
/// Any other error is returned at once. After the last attempt the final
/// `Timeout` is returned unchanged.
pub async fn retry_on_timeout<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> BeamlineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BeamlineResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err @ BeamlineError::Timeout { .. }) if attempt < attempts => {
                warn!(attempt, max_attempts = attempts, error = %err, "Retrying after timeout");
                attempt += 1;
                sleep(policy.backoff_delay).await;
            }
            result => return result,
        }
    }
}
