//! Bimorph mirror influence-function stepping.
//!
//! An influence-function measurement moves one electrode at a time: the
//! previous electrode is stepped back down and the chosen one stepped up by
//! the bank's step size, which is configured on the power supply itself.
//! The new demand vector is checked against the adjacent-electrode safety
//! bound before anything is written.

use crate::device::ProcessVariable;
use crate::error::{BeamlineError, BeamlineResult};
use crate::limits::{max_adjacent_delta, ELECTRODES_PER_BANK, MAX_ADJACENT_DEMAND_DELTA, MAX_ELECTRODE};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// High-voltage supply driving a bimorph mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bimorph {
    /// Horizontal focusing mirror supply
    Hfm,
    /// KB mirror pair supply (bank 1 vertical, bank 2 horizontal)
    Kb,
}

impl Bimorph {
    /// Accepted names.
    pub const ALLOWED: [&'static str; 2] = ["hfm", "kb"];

    /// Name as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bimorph::Hfm => "hfm",
            Bimorph::Kb => "kb",
        }
    }
}

impl fmt::Display for Bimorph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bimorph {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hfm" => Ok(Bimorph::Hfm),
            "kb" => Ok(Bimorph::Kb),
            other => Err(BeamlineError::Validation(format!(
                "bimorph '{other}' should be one of {:?}",
                Bimorph::ALLOWED
            ))),
        }
    }
}

/// PVs of one bimorph power supply.
pub struct BimorphSupply {
    bimorph: Bimorph,
    bank_select: Arc<dyn ProcessVariable>,
    increment: Arc<dyn ProcessVariable>,
    decrement: Arc<dyn ProcessVariable>,
    step: Arc<dyn ProcessVariable>,
    demands: Vec<Arc<dyn ProcessVariable>>,
}

impl BimorphSupply {
    /// `demands` holds the current-demand readbacks of all electrodes, U0 first.
    pub fn new(
        bimorph: Bimorph,
        bank_select: Arc<dyn ProcessVariable>,
        increment: Arc<dyn ProcessVariable>,
        decrement: Arc<dyn ProcessVariable>,
        step: Arc<dyn ProcessVariable>,
        demands: Vec<Arc<dyn ProcessVariable>>,
    ) -> BeamlineResult<Self> {
        let expected = MAX_ELECTRODE as usize + 1;
        if demands.len() != expected {
            return Err(BeamlineError::Validation(format!(
                "{bimorph} supply needs {expected} demand PVs, got {}",
                demands.len()
            )));
        }
        Ok(Self {
            bimorph,
            bank_select,
            increment,
            decrement,
            step,
            demands,
        })
    }

    /// Which mirror this supply drives.
    pub fn bimorph(&self) -> Bimorph {
        self.bimorph
    }
}

/// Tunables for [`step_electrode_influence`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOptions {
    /// Pause after selecting the bank, before reading the step and demands.
    pub bank_settle: Duration,
    /// Largest allowed difference between adjacent demands.
    pub max_adjacent_delta: f64,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            bank_settle: Duration::from_millis(500),
            max_adjacent_delta: MAX_ADJACENT_DEMAND_DELTA,
        }
    }
}

/// What a successful step did.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeStep {
    /// Electrode stepped up.
    pub electrode: u32,
    /// Electrode stepped down, if any.
    pub decremented: Option<u32>,
    /// Step size read from the supply.
    pub step: f64,
    /// Bank demands before the step.
    pub demands_before: Vec<f64>,
    /// Bank demands the step is expected to produce.
    pub demands_after: Vec<f64>,
}

/// Step `electrode` up and its predecessor down by the bank's step size.
///
/// `bank` is 1 (HFM, vertical KB) or 2 (horizontal KB) and must contain
/// `electrode`. Both writes are fire-and-forget.
///
/// # Errors
/// - `Validation` for an electrode outside 0-31, a bank other than 1 or 2,
///   or an electrode outside the bank
/// - `SafetyAbort` when an adjacent demand difference would exceed the
///   bound; no step is written
/// - `PartialActuation` when the increment fails after the decrement went
///   through; the decrement is undone best-effort first
pub async fn step_electrode_influence(
    supply: &BimorphSupply,
    electrode: u32,
    bank: u8,
    options: StepOptions,
) -> BeamlineResult<ElectrodeStep> {
    if electrode > MAX_ELECTRODE {
        return Err(BeamlineError::Validation(format!(
            "electrode must be between 0 and {MAX_ELECTRODE}, got {electrode}"
        )));
    }
    if !(1..=2).contains(&bank) {
        return Err(BeamlineError::Validation(format!(
            "bank must be 1 or 2, got {bank}"
        )));
    }
    let bank_index = usize::from(bank - 1);
    if electrode as usize / ELECTRODES_PER_BANK != bank_index {
        return Err(BeamlineError::Validation(format!(
            "electrode {electrode} is not in bank {bank}"
        )));
    }

    supply
        .bank_select
        .put(f64::from(bank - 1), true)
        .await
        .map_err(BeamlineError::device(supply.bank_select.name()))?;
    tokio::time::sleep(options.bank_settle).await;

    let step = supply
        .step
        .get()
        .await
        .map_err(BeamlineError::device(supply.step.name()))?;
    let first = bank_index * ELECTRODES_PER_BANK;
    let mut demands_before = Vec::with_capacity(ELECTRODES_PER_BANK);
    for pv in &supply.demands[first..first + ELECTRODES_PER_BANK] {
        demands_before.push(pv.get().await.map_err(BeamlineError::device(pv.name()))?);
    }

    let i = electrode as usize % ELECTRODES_PER_BANK;
    let mut demands_after = demands_before.clone();
    if i > 0 {
        demands_after[i - 1] -= step;
    }
    demands_after[i] += step;

    let delta = max_adjacent_delta(&demands_after);
    if delta > options.max_adjacent_delta {
        warn!(
            bimorph = %supply.bimorph,
            electrode,
            delta,
            "Adjacent electrode difference too large, not stepping"
        );
        return Err(BeamlineError::SafetyAbort {
            delta,
            limit: options.max_adjacent_delta,
        });
    }

    let decremented = (i > 0).then(|| electrode - 1);
    if let Some(previous) = decremented {
        info!(bimorph = %supply.bimorph, electrode = previous, step, "Decrementing electrode");
        supply
            .decrement
            .put(f64::from(previous), false)
            .await
            .map_err(BeamlineError::device(supply.decrement.name()))?;
    }

    info!(bimorph = %supply.bimorph, electrode, step, "Incrementing electrode");
    if let Err(err) = supply.increment.put(f64::from(electrode), false).await {
        let err = BeamlineError::device(supply.increment.name())(err);
        let Some(previous) = decremented else {
            return Err(err);
        };
        let rolled_back = match supply.increment.put(f64::from(previous), false).await {
            Ok(()) => true,
            Err(rollback_err) => {
                warn!(electrode = previous, error = %rollback_err, "Rollback of decrement failed");
                false
            }
        };
        return Err(BeamlineError::PartialActuation {
            device: supply.bimorph.to_string(),
            rolled_back,
            source: Box::new(err),
        });
    }

    Ok(ElectrodeStep {
        electrode,
        decremented,
        step,
        demands_before,
        demands_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockPv;

    struct Rig {
        bank_select: Arc<MockPv>,
        increment: Arc<MockPv>,
        decrement: Arc<MockPv>,
        supply: BimorphSupply,
    }

    fn rig(step: f64, demands: [f64; 32]) -> Rig {
        let bank_select = Arc::new(MockPv::new("BANK_NO_32", 0.0));
        let increment = Arc::new(MockPv::new("INCR_U_CMD.A", 0.0));
        let decrement = Arc::new(MockPv::new("DECR_U_CMD.A", 0.0));
        let demand_pvs: Vec<Arc<dyn ProcessVariable>> = demands
            .iter()
            .enumerate()
            .map(|(n, v)| Arc::new(MockPv::new(format!("U{n}_CURRENT_MON"), *v)) as Arc<dyn ProcessVariable>)
            .collect();
        let supply = BimorphSupply::new(
            Bimorph::Kb,
            bank_select.clone(),
            increment.clone(),
            decrement.clone(),
            Arc::new(MockPv::new("U_STEP_MON.A", step)),
            demand_pvs,
        )
        .unwrap();
        Rig {
            bank_select,
            increment,
            decrement,
            supply,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_previous_down_and_target_up() {
        let rig = rig(100.0, [0.0; 32]);
        let step = step_electrode_influence(&rig.supply, 5, 1, StepOptions::default())
            .await
            .unwrap();

        assert_eq!(rig.bank_select.writes().await, vec![0.0]);
        assert_eq!(rig.decrement.writes().await, vec![4.0]);
        assert_eq!(rig.increment.writes().await, vec![5.0]);
        assert_eq!(step.decremented, Some(4));
        assert_eq!(step.demands_after[4], -100.0);
        assert_eq!(step.demands_after[5], 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_electrode_of_bank_skips_decrement() {
        let rig = rig(100.0, [0.0; 32]);
        let step = step_electrode_influence(&rig.supply, 16, 2, StepOptions::default())
            .await
            .unwrap();
        assert_eq!(rig.bank_select.writes().await, vec![1.0]);
        assert!(rig.decrement.writes().await.is_empty());
        assert_eq!(rig.increment.writes().await, vec![16.0]);
        assert_eq!(step.decremented, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_demands_of_selected_bank() {
        let mut demands = [0.0; 32];
        demands[16..].copy_from_slice(&[250.0; 16]);
        let rig = rig(50.0, demands);
        let step = step_electrode_influence(&rig.supply, 20, 2, StepOptions::default())
            .await
            .unwrap();
        assert_eq!(step.demands_before, vec![250.0; 16]);
        assert_eq!(step.demands_after[3], 200.0);
        assert_eq!(step.demands_after[4], 300.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_abort_writes_nothing() {
        let rig = rig(300.0, [0.0; 32]);
        // -300 next to +300 is a 600 V jump.
        let err = step_electrode_influence(&rig.supply, 3, 1, StepOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::SafetyAbort { delta, .. } if delta == 600.0));
        assert!(rig.decrement.writes().await.is_empty());
        assert!(rig.increment.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation() {
        let rig = rig(100.0, [0.0; 32]);
        for (electrode, bank) in [(32, 2), (3, 0), (3, 3), (20, 1), (3, 2)] {
            let err = step_electrode_influence(&rig.supply, electrode, bank, StepOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, BeamlineError::Validation(_)), "{electrode}/{bank}");
        }
        assert!(rig.bank_select.writes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_increment_rolls_back_decrement() {
        let rig = rig(100.0, [0.0; 32]);
        rig.increment.fail_next_puts(1);
        let err = step_electrode_influence(&rig.supply, 7, 1, StepOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BeamlineError::PartialActuation { rolled_back: true, .. }
        ));
        assert_eq!(rig.decrement.writes().await, vec![6.0]);
        assert_eq!(rig.increment.writes().await, vec![6.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rollback_is_reported() {
        let rig = rig(100.0, [0.0; 32]);
        rig.increment.fail_puts(true);
        let err = step_electrode_influence(&rig.supply, 7, 1, StepOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BeamlineError::PartialActuation { rolled_back: false, .. }
        ));
    }

    #[test]
    fn test_bimorph_names() {
        assert_eq!("kb".parse::<Bimorph>().unwrap(), Bimorph::Kb);
        assert_eq!("hfm".parse::<Bimorph>().unwrap(), Bimorph::Hfm);
        assert!("vfm".parse::<Bimorph>().is_err());
    }

    #[test]
    fn test_supply_needs_all_demands() {
        let pv = || Arc::new(MockPv::new("x", 0.0)) as Arc<dyn ProcessVariable>;
        let result = BimorphSupply::new(Bimorph::Hfm, pv(), pv(), pv(), pv(), vec![pv(); 16]);
        assert!(result.is_err());
    }
}
