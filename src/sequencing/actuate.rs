//! Command an actuator once, then poll until its status satisfies a predicate.
//!
//! This is the one wait primitive every beamline sequence uses. A command is
//! sent exactly once; after that only reads happen. The wait ends when the
//! predicate holds, when the device reports [`ActuatorStatus::Error`], when
//! the optional timeout elapses, or when the optional cancellation token
//! fires.

use crate::device::{Actuator, ActuatorStatus};
use crate::error::{BeamlineError, BeamlineResult};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sampling interval and optional bound for a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Time between status reads.
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits indefinitely, as does a bound
    /// too large to add to the current instant.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Poll every `poll_interval` with no bound.
    pub fn every(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            timeout: None,
        }
    }

    /// Bound the wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::every(Duration::from_millis(500))
    }
}

/// A single actuation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    /// Must match [`Actuator::id`] of the device it is sent to.
    pub target_device_id: String,
    /// Value written to the device.
    pub requested_state: f64,
    /// Time between status reads.
    pub poll_interval: Duration,
    /// Optional bound on the wait.
    pub timeout: Option<Duration>,
}

impl ActuatorCommand {
    /// Command `target` to `requested_state`, polling per `policy`.
    pub fn new(target: impl Into<String>, requested_state: f64, policy: PollPolicy) -> Self {
        Self {
            target_device_id: target.into(),
            requested_state,
            poll_interval: policy.poll_interval,
            timeout: policy.timeout,
        }
    }
}

/// Send `command` to `actuator` and wait until `predicate(status)` holds.
///
/// Returns the status that satisfied the predicate.
///
/// # Errors
/// - `Validation` if the command targets another device or polls at zero interval
/// - `Device` if the send or a status read fails
/// - `ActuatorFault` if the device reports `Error` and the predicate rejects it
/// - `Timeout` once `command.timeout` has elapsed
/// - `Cancelled` if `cancel` fires
pub async fn actuate_and_await<A, P>(
    actuator: &A,
    command: &ActuatorCommand,
    predicate: P,
    cancel: Option<&CancellationToken>,
) -> BeamlineResult<ActuatorStatus>
where
    A: Actuator + ?Sized,
    P: Fn(ActuatorStatus) -> bool,
{
    let id = actuator.id();
    if command.target_device_id != id {
        return Err(BeamlineError::Validation(format!(
            "command for '{}' sent to '{}'",
            command.target_device_id, id
        )));
    }
    if command.poll_interval.is_zero() {
        return Err(BeamlineError::Validation(
            "poll interval must be greater than zero".to_string(),
        ));
    }

    info!(device = id, state = command.requested_state, "Actuating");
    actuator
        .send(command.requested_state)
        .await
        .map_err(BeamlineError::device(id))?;

    let start = Instant::now();
    // A bound past the end of the clock is no bound.
    let deadline = command.timeout.and_then(|t| start.checked_add(t));

    loop {
        let status = actuator
            .status()
            .await
            .map_err(BeamlineError::device(id))?;
        if predicate(status) {
            debug!(device = id, status = status.as_str(), elapsed = ?start.elapsed(), "Actuation complete");
            return Ok(status);
        }
        if status == ActuatorStatus::Error {
            return Err(BeamlineError::ActuatorFault(id.to_string()));
        }

        let mut wait = command.poll_interval;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(BeamlineError::Timeout {
                    device: id.to_string(),
                    elapsed: now - start,
                });
            }
            wait = wait.min(deadline - now);
        }

        debug!(device = id, status = status.as_str(), "Waiting");
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(BeamlineError::Cancelled(id.to_string()));
                    }
                    _ = sleep(wait) => {}
                }
            }
            None => sleep(wait).await,
        }
    }
}

/// [`actuate_and_await`] with the usual "reached position" predicate.
pub async fn actuate_until_in_position<A>(
    actuator: &A,
    command: &ActuatorCommand,
    cancel: Option<&CancellationToken>,
) -> BeamlineResult<()>
where
    A: Actuator + ?Sized,
{
    actuate_and_await(
        actuator,
        command,
        |status| status == ActuatorStatus::InPosition,
        cancel,
    )
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockActuator;
    use crate::device::ActuatorStatus::{Error, InPosition, Pending};

    fn command(target: &str, timeout: Option<Duration>) -> ActuatorCommand {
        ActuatorCommand {
            target_device_id: target.to_string(),
            requested_state: 1.0,
            poll_interval: Duration::from_millis(100),
            timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_once_and_polls_until_in_position() {
        let act = MockActuator::new("cover", vec![Pending, Pending, InPosition]);
        let status = actuate_and_await(&act, &command("cover", None), |s| s == InPosition, None)
            .await
            .unwrap();
        assert_eq!(status, InPosition);
        assert_eq!(act.sent().await, vec![1.0]);
        assert_eq!(act.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_in_position_is_single_poll() {
        let act = MockActuator::new("cover", vec![InPosition]);
        actuate_until_in_position(&act, &command("cover", None), None)
            .await
            .unwrap();
        actuate_until_in_position(&act, &command("cover", None), None)
            .await
            .unwrap();
        assert_eq!(act.sent().await, vec![1.0, 1.0]);
        assert_eq!(act.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let act = MockActuator::stuck("annealer");
        let timeout = Duration::from_secs(2);
        let err = actuate_until_in_position(&act, &command("annealer", Some(timeout)), None)
            .await
            .unwrap_err();
        match err {
            BeamlineError::Timeout { device, elapsed } => {
                assert_eq!(device, "annealer");
                assert!(elapsed >= timeout);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(act.sent().await.len(), 1);
        // Initial poll plus one every 100 ms up to and including the deadline.
        let polls = act.poll_count();
        assert!((20..=22).contains(&polls), "polled {polls} times");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_fault() {
        let act = MockActuator::new("atten", vec![Pending, Error]);
        let err = actuate_until_in_position(&act, &command("atten", None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::ActuatorFault(id) if id == "atten"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_may_accept_error() {
        let act = MockActuator::new("atten", vec![Error]);
        let status = actuate_and_await(&act, &command("atten", None), |_| true, None)
            .await
            .unwrap();
        assert_eq!(status, Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let act = MockActuator::stuck("cover");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(350)).await;
            canceller.cancel();
        });
        let err = actuate_until_in_position(&act, &command("cover", None), Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_waits_unbounded() {
        let act = MockActuator::new("cover", vec![InPosition]);
        let policy = PollPolicy::every(Duration::from_millis(100)).with_timeout(Duration::MAX);
        let cmd = ActuatorCommand::new("cover", 1.0, policy);
        let status = actuate_until_in_position(&act, &cmd, None).await.unwrap();
        assert_eq!(status, InPosition);

        let stuck = MockActuator::stuck("cover");
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });
        let err = actuate_until_in_position(&stuck, &cmd, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_wrong_target_sends_nothing() {
        let act = MockActuator::stuck("cover");
        let err = actuate_until_in_position(&act, &command("annealer", None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Validation(_)));
        assert!(act.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_rejected() {
        let act = MockActuator::stuck("cover");
        let mut cmd = command("cover", None);
        cmd.poll_interval = Duration::ZERO;
        assert!(actuate_until_in_position(&act, &cmd, None).await.is_err());
        assert!(act.sent().await.is_empty());
    }
}
