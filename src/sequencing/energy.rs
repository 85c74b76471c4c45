//! Photon energy change from per-motor lookup tables.
//!
//! Each tabulated motor has an energy/position table stored in the control
//! system as a pair of waveforms (`X` energies, `Y` positions). The KB mirror
//! pitches and fine positions are not tabulated; each keeps one last good
//! position (LGP) that is restored on every energy change.

use super::beamsize::{set_beam_size, Transfocator};
use crate::device::{ProcessVariable, Waveform};
use crate::error::{BeamlineError, BeamlineResult};
use crate::limits::CRL_RETRACT_BELOW_EV;
use crate::physics::LookupTable;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Names accepted by [`LookupTableStore`]. `ivu_gap_off` is the undulator
/// offset applied after a gap scan; `atten` is the attenuator table.
pub const LUT_NAMES: [&str; 11] = [
    "ivu_gap",
    "hdcm_g",
    "hdcm_r",
    "hdcm_p",
    "hfm_y",
    "hfm_x",
    "hfm_pitch",
    "kbm_hy",
    "kbm_vx",
    "atten",
    "ivu_gap_off",
];

/// Names accepted by [`LastGoodPositions`].
pub const LGP_NAMES: [&str; 4] = ["kbm_hp", "kbm_hx", "kbm_vp", "kbm_vy"];

/// Motors moved from their tables, in move order. The undulator goes first,
/// then the monochromator energy, then the rest.
pub const TABULATED_MOTORS: [&str; 9] = [
    "ivu_gap",
    "hdcm_g",
    "hdcm_r",
    "hdcm_p",
    "hfm_x",
    "hfm_y",
    "hfm_pitch",
    "kbm_vx",
    "kbm_hy",
];

/// Motors restored to their last good position, in move order.
pub const FIXED_MOTORS: [&str; 4] = ["kbm_vy", "kbm_vp", "kbm_hx", "kbm_hp"];

/// Slit 1 gaps [µm] opened before the optics move.
pub const SLIT1_OPEN_GAP: (f64, f64) = (3000.0, 2000.0);

/// Waveform PV holding one axis (`'X'` or `'Y'`) of a named table.
pub fn lut_pv_name(name: &str, axis: char) -> String {
    format!("XF:17ID-ES:FMX{{Misc-LUT:{name}}}{axis}-Wfm")
}

/// Setpoint PV holding a last good position.
pub fn lgp_pv_name(name: &str) -> String {
    format!("XF:17ID-ES:FMX{{Misc-LGP:{name}}}Pos-SP")
}

fn check_name(name: &str, valid: &[&str]) -> BeamlineResult<()> {
    if valid.contains(&name) {
        Ok(())
    } else {
        Err(BeamlineError::Validation(format!(
            "name must be one of {valid:?}, got '{name}'"
        )))
    }
}

// =============================================================================
// Lookup tables
// =============================================================================

/// Named energy lookup tables backed by waveform pairs.
#[derive(Default)]
pub struct LookupTableStore {
    tables: HashMap<String, (Arc<dyn Waveform>, Arc<dyn Waveform>)>,
}

impl LookupTableStore {
    /// Store with no tables wired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the energy and position waveforms of table `name`.
    pub fn with_table(
        mut self,
        name: &str,
        energy: Arc<dyn Waveform>,
        position: Arc<dyn Waveform>,
    ) -> BeamlineResult<Self> {
        check_name(name, &LUT_NAMES)?;
        self.tables.insert(name.to_string(), (energy, position));
        Ok(self)
    }

    fn axes(&self, name: &str) -> BeamlineResult<&(Arc<dyn Waveform>, Arc<dyn Waveform>)> {
        check_name(name, &LUT_NAMES)?;
        self.tables.get(name).ok_or_else(|| {
            BeamlineError::Validation(format!("no lookup table wired for '{name}'"))
        })
    }

    /// Read table `name`.
    pub async fn read(&self, name: &str) -> BeamlineResult<LookupTable> {
        let (energy, position) = self.axes(name)?;
        let x = energy.get().await.map_err(BeamlineError::device(energy.name()))?;
        let y = position
            .get()
            .await
            .map_err(BeamlineError::device(position.name()))?;
        LookupTable::new(x, y)
    }

    /// Replace table `name`.
    ///
    /// The new table is validated before anything is written. If the
    /// position write fails the previous energy axis is written back.
    ///
    /// # Errors
    /// - `Validation` for an unknown name or a malformed table (nothing written)
    /// - `Device` if the energy write fails
    /// - `PartialActuation` if the position write fails after the energy write
    pub async fn write(&self, name: &str, energy: &[f64], position: &[f64]) -> BeamlineResult<()> {
        let (energy_pv, position_pv) = self.axes(name)?;
        let table = LookupTable::new(energy.to_vec(), position.to_vec())?;

        let previous = energy_pv
            .get()
            .await
            .map_err(BeamlineError::device(energy_pv.name()))?;
        energy_pv
            .put(table.energies())
            .await
            .map_err(BeamlineError::device(energy_pv.name()))?;

        if let Err(err) = position_pv.put(table.positions()).await {
            let rolled_back = match energy_pv.put(&previous).await {
                Ok(()) => true,
                Err(restore) => {
                    warn!(pv = energy_pv.name(), error = %restore, "Failed to restore lookup table energies");
                    false
                }
            };
            return Err(BeamlineError::PartialActuation {
                device: name.to_string(),
                rolled_back,
                source: Box::new(BeamlineError::device(position_pv.name())(err)),
            });
        }
        info!(table = name, points = table.len(), "Lookup table written");
        Ok(())
    }
}

// =============================================================================
// Last good positions
// =============================================================================

/// Named last good positions backed by scalar setpoints.
#[derive(Default)]
pub struct LastGoodPositions {
    positions: HashMap<String, Arc<dyn ProcessVariable>>,
}

impl LastGoodPositions {
    /// Store with no positions wired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the setpoint of position `name`.
    pub fn with_position(mut self, name: &str, pv: Arc<dyn ProcessVariable>) -> BeamlineResult<Self> {
        check_name(name, &LGP_NAMES)?;
        self.positions.insert(name.to_string(), pv);
        Ok(self)
    }

    fn pv(&self, name: &str) -> BeamlineResult<&Arc<dyn ProcessVariable>> {
        check_name(name, &LGP_NAMES)?;
        self.positions.get(name).ok_or_else(|| {
            BeamlineError::Validation(format!("no last good position wired for '{name}'"))
        })
    }

    /// Read position `name`.
    pub async fn read(&self, name: &str) -> BeamlineResult<f64> {
        let pv = self.pv(name)?;
        pv.get().await.map_err(BeamlineError::device(pv.name()))
    }

    /// Store a new position for `name`.
    pub async fn write(&self, name: &str, position: f64) -> BeamlineResult<()> {
        let pv = self.pv(name)?;
        if !position.is_finite() {
            return Err(BeamlineError::Validation(format!(
                "last good position for '{name}' must be finite, got {position}"
            )));
        }
        pv.put(position, true)
            .await
            .map_err(BeamlineError::device(pv.name()))
    }
}

// =============================================================================
// Energy change
// =============================================================================

/// Motors and slits moved by an energy change.
pub struct EnergyMotors {
    slit_x_gap: Arc<dyn ProcessVariable>,
    slit_y_gap: Arc<dyn ProcessVariable>,
    energy: Arc<dyn ProcessVariable>,
    motors: HashMap<String, Arc<dyn ProcessVariable>>,
}

impl EnergyMotors {
    /// Wire the slit 1 gaps and the monochromator energy setpoint.
    pub fn new(
        slit_x_gap: Arc<dyn ProcessVariable>,
        slit_y_gap: Arc<dyn ProcessVariable>,
        energy: Arc<dyn ProcessVariable>,
    ) -> Self {
        Self {
            slit_x_gap,
            slit_y_gap,
            energy,
            motors: HashMap::new(),
        }
    }

    /// Wire a tabulated or fixed motor by name.
    pub fn with_motor(mut self, name: &str, pv: Arc<dyn ProcessVariable>) -> BeamlineResult<Self> {
        if !TABULATED_MOTORS.contains(&name) && !FIXED_MOTORS.contains(&name) {
            return Err(BeamlineError::Validation(format!(
                "'{name}' is not moved by an energy change"
            )));
        }
        self.motors.insert(name.to_string(), pv);
        Ok(self)
    }

    fn motor(&self, name: &str) -> BeamlineResult<&Arc<dyn ProcessVariable>> {
        self.motors
            .get(name)
            .ok_or_else(|| BeamlineError::Validation(format!("motor '{name}' is not wired")))
    }
}

async fn move_to(pv: &dyn ProcessVariable, position: f64) -> BeamlineResult<()> {
    debug!(pv = pv.name(), position, "Moving");
    pv.put(position, true)
        .await
        .map_err(BeamlineError::device(pv.name()))
}

/// Move the undulator, monochromator, HFM and KB mirrors to `energy_ev`.
///
/// Every table and last good position is read, and every motor looked up,
/// before anything moves. Then slit 1 opens, the CRLs are retracted when
/// going below 9001 eV, and the motors move in [`TABULATED_MOTORS`] and
/// [`FIXED_MOTORS`] order with the monochromator energy right after the
/// undulator gap. Returns each motor with the position it was sent to.
///
/// A failed move stops the sequence; motors already moved stay where they are.
pub async fn set_energy_motors(
    energy_ev: f64,
    motors: &EnergyMotors,
    tables: &LookupTableStore,
    positions: &LastGoodPositions,
    transfocator: &Transfocator,
) -> BeamlineResult<Vec<(&'static str, f64)>> {
    if !(energy_ev > 0.0) || !energy_ev.is_finite() {
        return Err(BeamlineError::Validation(format!(
            "energy {energy_ev} eV must be positive"
        )));
    }

    let mut plan = Vec::with_capacity(TABULATED_MOTORS.len() + FIXED_MOTORS.len());
    for name in TABULATED_MOTORS {
        motors.motor(name)?;
        plan.push((name, tables.read(name).await?.interp(energy_ev)));
    }
    for name in FIXED_MOTORS {
        motors.motor(name)?;
        plan.push((name, positions.read(name).await?));
    }

    info!(energy_ev, "Setting FMX motor positions");
    move_to(motors.slit_x_gap.as_ref(), SLIT1_OPEN_GAP.0).await?;
    move_to(motors.slit_y_gap.as_ref(), SLIT1_OPEN_GAP.1).await?;

    if energy_ev < CRL_RETRACT_BELOW_EV {
        set_beam_size(transfocator, energy_ev, "V0", "H0").await?;
    }

    for (index, &(name, position)) in plan.iter().enumerate() {
        move_to(motors.motor(name)?.as_ref(), position).await?;
        if index == 0 {
            move_to(motors.energy.as_ref(), energy_ev).await?;
        }
    }
    info!(energy_ev, "FMX motor positions set");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockPv, MockWaveform};
    use crate::sequencing::Lens;

    fn table(name: &str, x: Vec<f64>, y: Vec<f64>) -> (Arc<MockWaveform>, Arc<MockWaveform>) {
        (
            Arc::new(MockWaveform::new(lut_pv_name(name, 'X'), x)),
            Arc::new(MockWaveform::new(lut_pv_name(name, 'Y'), y)),
        )
    }

    #[test]
    fn test_pv_names() {
        assert_eq!(lut_pv_name("hdcm_p", 'X'), "XF:17ID-ES:FMX{Misc-LUT:hdcm_p}X-Wfm");
        assert_eq!(lgp_pv_name("kbm_vy"), "XF:17ID-ES:FMX{Misc-LGP:kbm_vy}Pos-SP");
    }

    #[tokio::test]
    async fn test_lut_read_write() {
        let (x, y) = table("hdcm_p", vec![7000.0, 13000.0], vec![0.1, 0.2]);
        let store = LookupTableStore::new()
            .with_table("hdcm_p", x.clone(), y.clone())
            .unwrap();
        assert!((store.read("hdcm_p").await.unwrap().interp(10000.0) - 0.15).abs() < 1e-12);

        store
            .write("hdcm_p", &[6000.0, 12000.0, 18000.0], &[0.0, 0.3, 0.6])
            .await
            .unwrap();
        assert_eq!(x.values().await, vec![6000.0, 12000.0, 18000.0]);
        assert_eq!(y.values().await, vec![0.0, 0.3, 0.6]);
    }

    #[tokio::test]
    async fn test_lut_rejects_unknown_names() {
        let (x, y) = table("hdcm_e", vec![1.0], vec![1.0]);
        assert!(matches!(
            LookupTableStore::new().with_table("hdcm_e", x, y),
            Err(BeamlineError::Validation(_))
        ));
        let store = LookupTableStore::new();
        assert!(store.read("kbm_vy").await.is_err());
        // Valid name, nothing wired.
        assert!(store.read("atten").await.is_err());
    }

    #[tokio::test]
    async fn test_lut_unequal_lengths_write_nothing() {
        let (x, y) = table("hfm_pitch", vec![7000.0], vec![1.0]);
        let store = LookupTableStore::new()
            .with_table("hfm_pitch", x.clone(), y.clone())
            .unwrap();
        let err = store
            .write("hfm_pitch", &[7000.0, 12000.0], &[1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Validation(_)));
        assert_eq!(x.put_count(), 0);
        assert_eq!(y.put_count(), 0);
    }

    #[tokio::test]
    async fn test_lut_failed_position_write_restores_energies() {
        let (x, y) = table("kbm_hy", vec![7000.0], vec![1.0]);
        y.fail_puts(true);
        let store = LookupTableStore::new()
            .with_table("kbm_hy", x.clone(), y.clone())
            .unwrap();
        let err = store
            .write("kbm_hy", &[8000.0, 9000.0], &[2.0, 3.0])
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::PartialActuation { rolled_back: true, .. }));
        assert_eq!(x.values().await, vec![7000.0]);
        assert_eq!(y.values().await, vec![1.0]);
    }

    #[tokio::test]
    async fn test_lgp_read_write() {
        let pv = Arc::new(MockPv::new(lgp_pv_name("kbm_vp"), -2.5));
        let store = LastGoodPositions::new().with_position("kbm_vp", pv.clone()).unwrap();
        assert_eq!(store.read("kbm_vp").await.unwrap(), -2.5);
        store.write("kbm_vp", -2.4).await.unwrap();
        assert_eq!(pv.writes().await, vec![-2.4]);

        assert!(store.write("kbm_vp", f64::NAN).await.is_err());
        assert!(store.read("hdcm_p").await.is_err());
        assert!(LastGoodPositions::new().with_position("hfm_x", pv).is_err());
    }

    struct Rig {
        slit_x: Arc<MockPv>,
        slit_y: Arc<MockPv>,
        energy: Arc<MockPv>,
        motors: Vec<(&'static str, Arc<MockPv>)>,
        lens_out: Vec<Arc<MockPv>>,
        wired: EnergyMotors,
        tables: LookupTableStore,
        positions: LastGoodPositions,
        transfocator: Transfocator,
    }

    fn energy_rig() -> Rig {
        let slit_x = Arc::new(MockPv::new("slits1.x_gap", 500.0));
        let slit_y = Arc::new(MockPv::new("slits1.y_gap", 500.0));
        let energy = Arc::new(MockPv::new("hdcm.e", 12660.0));
        let mut wired = EnergyMotors::new(slit_x.clone(), slit_y.clone(), energy.clone());
        let mut tables = LookupTableStore::new();
        let mut positions = LastGoodPositions::new();
        let mut motors = Vec::new();

        // Tabulated motor n goes from n at 7 keV to n + 6 at 13 keV.
        for (n, name) in TABULATED_MOTORS.into_iter().enumerate() {
            let n = n as f64;
            let (x, y) = table(name, vec![7000.0, 13000.0], vec![n, n + 6.0]);
            tables = tables.with_table(name, x, y).unwrap();
            let pv = Arc::new(MockPv::new(name, 0.0));
            wired = wired.with_motor(name, pv.clone()).unwrap();
            motors.push((name, pv));
        }
        for (n, name) in FIXED_MOTORS.into_iter().enumerate() {
            let lgp = Arc::new(MockPv::new(lgp_pv_name(name), 100.0 + n as f64));
            positions = positions.with_position(name, lgp).unwrap();
            let pv = Arc::new(MockPv::new(name, 0.0));
            wired = wired.with_motor(name, pv.clone()).unwrap();
            motors.push((name, pv));
        }

        let mut lens_out = Vec::new();
        let mut lens = |name: &str| {
            let out = Arc::new(MockPv::new(format!("{name}:Mv-Cmd:Out"), 0.0));
            lens_out.push(out.clone());
            Lens::new(Arc::new(MockPv::new(format!("{name}:Mv-Cmd:In"), 0.0)), out)
        };
        let transfocator = Transfocator {
            vs: lens("vs"),
            v2a: lens("v2a"),
            v1a: lens("v1a"),
            v1b: lens("v1b"),
            h4a: lens("h4a"),
            h2a: lens("h2a"),
            h1a: lens("h1a"),
            h1b: lens("h1b"),
        };

        Rig {
            slit_x,
            slit_y,
            energy,
            motors,
            lens_out,
            wired,
            tables,
            positions,
            transfocator,
        }
    }

    async fn lenses_retracted(rig: &Rig) -> usize {
        let mut count = 0;
        for out in &rig.lens_out {
            count += out.writes().await.len();
        }
        count
    }

    #[tokio::test]
    async fn test_set_energy_moves_everything() {
        let rig = energy_rig();
        let plan = set_energy_motors(10000.0, &rig.wired, &rig.tables, &rig.positions, &rig.transfocator)
            .await
            .unwrap();

        assert_eq!(plan.len(), 13);
        assert_eq!(rig.slit_x.writes().await, vec![3000.0]);
        assert_eq!(rig.slit_y.writes().await, vec![2000.0]);
        assert_eq!(rig.energy.writes().await, vec![10000.0]);
        for (n, (name, pv)) in rig.motors.iter().enumerate() {
            // Halfway through the table, or the stored LGP.
            let expected = if n < 9 { n as f64 + 3.0 } else { 100.0 + (n - 9) as f64 };
            assert_eq!(pv.writes().await, vec![expected], "{name}");
        }
        assert_eq!(lenses_retracted(&rig).await, 0);
    }

    #[tokio::test]
    async fn test_low_energy_retracts_crls() {
        let rig = energy_rig();
        set_energy_motors(9000.5, &rig.wired, &rig.tables, &rig.positions, &rig.transfocator)
            .await
            .unwrap();
        assert_eq!(lenses_retracted(&rig).await, 8);
        // Outside the table the end value is used.
        let rig = energy_rig();
        set_energy_motors(5000.0, &rig.wired, &rig.tables, &rig.positions, &rig.transfocator)
            .await
            .unwrap();
        assert_eq!(rig.motors[0].1.writes().await, vec![0.0]);
    }

    #[tokio::test]
    async fn test_missing_table_moves_nothing() {
        let mut rig = energy_rig();
        rig.tables = LookupTableStore::new();
        let err = set_energy_motors(12660.0, &rig.wired, &rig.tables, &rig.positions, &rig.transfocator)
            .await
            .unwrap_err();
        assert!(matches!(err, BeamlineError::Validation(_)));
        assert!(rig.slit_x.writes().await.is_empty());
        assert!(rig.energy.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_energy_and_motor_names() {
        let rig = energy_rig();
        for energy in [0.0, -12660.0, f64::NAN] {
            assert!(
                set_energy_motors(energy, &rig.wired, &rig.tables, &rig.positions, &rig.transfocator)
                    .await
                    .is_err()
            );
        }
        assert!(rig.slit_x.writes().await.is_empty());
        let motors = EnergyMotors::new(rig.slit_x.clone(), rig.slit_y.clone(), rig.energy.clone());
        assert!(motors.with_motor("atten", rig.slit_x.clone()).is_err());
    }
}
