//! Shared hard limits for beamline control parameters.

use crate::error::BeamlineError;

/// Electrodes per bimorph voltage bank.
pub const ELECTRODES_PER_BANK: usize = 16;
/// Highest electrode number across both banks.
pub const MAX_ELECTRODE: u32 = 31;
/// Largest allowed difference between adjacent electrode demands [V].
pub const MAX_ADJACENT_DEMAND_DELTA: f64 = 500.0;
/// Attenuator calibration range, inclusive [eV].
pub const ATTENUATOR_MIN_ENERGY_EV: f64 = 5000.0;
/// See [`ATTENUATOR_MIN_ENERGY_EV`].
pub const ATTENUATOR_MAX_ENERGY_EV: f64 = 30000.0;
/// Below this energy the beam should be defocused with the KB mirrors, not CRLs [eV].
pub const CRL_MIN_ENERGY_EV: f64 = 9000.0;
/// An energy change below this retracts every CRL [eV].
pub const CRL_RETRACT_BELOW_EV: f64 = 9001.0;

/// Check an energy against an inclusive attenuator range.
pub fn validate_attenuator_energy(energy_ev: f64, min: f64, max: f64) -> Result<(), BeamlineError> {
    if !energy_ev.is_finite() || energy_ev < min || energy_ev > max {
        return Err(BeamlineError::Validation(format!(
            "Monochromator energy {energy_ev:.1} eV out of range. Must be within {min:.0} - {max:.0} eV"
        )));
    }
    Ok(())
}

/// Check that a transmission is a fraction in `[0, 1]`.
pub fn validate_transmission(transmission: f64) -> Result<(), BeamlineError> {
    if !(0.0..=1.0).contains(&transmission) {
        return Err(BeamlineError::Validation(format!(
            "transmission {transmission} must be within 0 - 1"
        )));
    }
    Ok(())
}

/// Largest absolute difference between neighbouring values.
pub fn max_adjacent_delta(values: &[f64]) -> f64 {
    values
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f64::max)
}
