//! Crystal annealing: briefly block the cryostream with the annealer paddle.
//!
//! Sequence: governor `SA` → `CB`, air on, wait for the paddle to report in,
//! dwell, air off, wait for the paddle to report out, governor back to `SA`.

use super::actuate::{actuate_until_in_position, ActuatorCommand, PollPolicy};
use crate::device::{Governor, ProcessVariable, PvActuator, StatusFlag};
use crate::error::{BeamlineError, BeamlineResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Governor state for sample alignment; annealing starts and ends here.
pub const GOVERNOR_SAMPLE_ALIGNMENT: &str = "SA";
/// Governor state for the cryostream-blocked configuration.
pub const GOVERNOR_CRYO_BLOCKED: &str = "CB";
/// Default time the paddle stays in [s].
pub const DEFAULT_ANNEAL_DWELL: Duration = Duration::from_secs(1);

/// Pneumatic annealer paddle.
pub struct Annealer {
    air: Arc<dyn ProcessVariable>,
    in_status: Arc<dyn ProcessVariable>,
    out_status: Arc<dyn ProcessVariable>,
}

impl Annealer {
    /// Wire the air valve and the in/out limit flags.
    pub fn new(
        air: Arc<dyn ProcessVariable>,
        in_status: Arc<dyn ProcessVariable>,
        out_status: Arc<dyn ProcessVariable>,
    ) -> Self {
        Self {
            air,
            in_status,
            out_status,
        }
    }

    async fn insert(&self, policy: PollPolicy, cancel: Option<&CancellationToken>) -> BeamlineResult<()> {
        let actuator = PvActuator::new(
            "annealer.in",
            Arc::clone(&self.air),
            Arc::clone(&self.in_status),
            StatusFlag::Truthy,
        );
        let command = ActuatorCommand::new("annealer.in", 1.0, policy);
        actuate_until_in_position(&actuator, &command, cancel).await
    }

    async fn retract(&self, policy: PollPolicy, cancel: Option<&CancellationToken>) -> BeamlineResult<()> {
        let actuator = PvActuator::new(
            "annealer.out",
            Arc::clone(&self.air),
            Arc::clone(&self.out_status),
            StatusFlag::Truthy,
        );
        let command = ActuatorCommand::new("annealer.out", 0.0, policy);
        actuate_until_in_position(&actuator, &command, cancel).await
    }

    /// Close the air without waiting; used to back out of a failed insertion.
    async fn force_air_off(&self) -> bool {
        match self.air.put(0.0, false).await {
            Ok(()) => true,
            Err(err) => {
                warn!(pv = self.air.name(), error = %err, "Failed to close annealer air");
                false
            }
        }
    }
}

/// Run one annealing cycle.
///
/// # Errors
/// - `Validation` if the governor is not in `SA` (nothing is actuated)
/// - any wait error; after the air has been opened a failure closes it
///   again best-effort and is reported as `PartialActuation`
/// - `PartialActuation` wrapping `Cancelled` if `cancel` fires during the
///   dwell; the air is closed without waiting for the paddle
pub async fn anneal(
    governor: &dyn Governor,
    annealer: &Annealer,
    dwell: Duration,
    policy: PollPolicy,
    cancel: Option<&CancellationToken>,
) -> BeamlineResult<()> {
    let in_sa = governor
        .is_in(GOVERNOR_SAMPLE_ALIGNMENT)
        .await
        .map_err(BeamlineError::device("governor"))?;
    if !in_sa {
        return Err(BeamlineError::Validation(format!(
            "Not in Governor state {GOVERNOR_SAMPLE_ALIGNMENT}"
        )));
    }

    governor
        .set_state(GOVERNOR_CRYO_BLOCKED)
        .await
        .map_err(BeamlineError::device("governor"))?;

    if let Err(err) = annealer.insert(policy, cancel).await {
        let rolled_back = annealer.force_air_off().await;
        return Err(BeamlineError::PartialActuation {
            device: "annealer".to_string(),
            rolled_back,
            source: Box::new(err),
        });
    }

    info!(dwell = ?dwell, "Annealer in");
    if let Some(token) = cancel {
        tokio::select! {
            _ = token.cancelled() => {
                let rolled_back = annealer.force_air_off().await;
                return Err(BeamlineError::PartialActuation {
                    device: "annealer".to_string(),
                    rolled_back,
                    source: Box::new(BeamlineError::Cancelled("annealer".to_string())),
                });
            }
            _ = tokio::time::sleep(dwell) => {}
        }
    } else {
        tokio::time::sleep(dwell).await;
    }

    annealer.retract(policy, cancel).await?;
    info!("Annealer out");

    governor
        .set_state(GOVERNOR_SAMPLE_ALIGNMENT)
        .await
        .map_err(BeamlineError::device("governor"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockGovernor, MockPv};

    fn rig(in_readbacks: Vec<f64>) -> (Arc<MockPv>, Annealer) {
        let air = Arc::new(MockPv::new("annealer:air", 0.0));
        let annealer = Annealer::new(
            air.clone(),
            Arc::new(MockPv::with_readbacks("annealer:in", in_readbacks)),
            Arc::new(MockPv::with_readbacks("annealer:out", vec![0.0, 1.0])),
        );
        (air, annealer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle() {
        let governor = MockGovernor::new("SA");
        let (air, annealer) = rig(vec![0.0, 0.0, 1.0]);
        let policy = PollPolicy::every(Duration::from_millis(100));

        anneal(&governor, &annealer, DEFAULT_ANNEAL_DWELL, policy, None)
            .await
            .unwrap();

        assert_eq!(air.writes().await, vec![1.0, 0.0]);
        assert_eq!(governor.transitions().await, vec!["CB", "SA"]);
    }

    #[tokio::test]
    async fn test_requires_sample_alignment() {
        let governor = MockGovernor::new("M");
        let (air, annealer) = rig(vec![1.0]);
        let err = anneal(&governor, &annealer, DEFAULT_ANNEAL_DWELL, PollPolicy::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Validation(_)));
        assert!(air.writes().await.is_empty());
        assert!(governor.transitions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_paddle_closes_air() {
        let governor = MockGovernor::new("SA");
        let (air, annealer) = rig(vec![0.0]);
        let policy = PollPolicy::every(Duration::from_millis(100)).with_timeout(Duration::from_secs(3));

        let err = anneal(&governor, &annealer, DEFAULT_ANNEAL_DWELL, policy, None)
            .await
            .unwrap_err();
        match err {
            BeamlineError::PartialActuation {
                rolled_back,
                source,
                ..
            } => {
                assert!(rolled_back);
                assert!(matches!(*source, BeamlineError::Timeout { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(air.writes().await, vec![1.0, 0.0]);
        // The governor is left in CB for the operator to inspect.
        assert_eq!(governor.state().await, "CB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_dwell_closes_air() {
        let governor = MockGovernor::new("SA");
        let (air, annealer) = rig(vec![1.0]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });
        let start = tokio::time::Instant::now();

        let err = anneal(
            &governor,
            &annealer,
            Duration::from_secs(60),
            PollPolicy::every(Duration::from_millis(100)),
            Some(&token),
        )
        .await
        .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(60));
        match err {
            BeamlineError::PartialActuation {
                rolled_back,
                source,
                ..
            } => {
                assert!(rolled_back);
                assert!(matches!(*source, BeamlineError::Cancelled(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(air.writes().await, vec![1.0, 0.0]);
        assert_eq!(governor.state().await, "CB");
    }
}
