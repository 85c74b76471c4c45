//! Physical constants and the input-unit heuristics used across the beamline.
//!
//! Two conventions are inherited from the beamline macros and kept verbatim:
//! a Bragg angle above [`RADIAN_THRESHOLD`] is read as degrees, anything at or
//! below it as radians; an energy below [`KEV_THRESHOLD`] is read as keV.
//! Both silently change meaning at the boundary, so callers that know their
//! units should convert before calling.

use crate::error::{BeamlineError, BeamlineResult};

/// Photon energy times wavelength, h·c [eV·Å].
pub const HC_EV_ANGSTROM: f64 = 12398.42;
/// Silicon lattice constant [Å].
pub const SI_LATTICE_A: f64 = 5.43102;
/// Relative lattice contraction of the liquid-nitrogen cooled first crystal.
pub const LN2_LATTICE_CORRECTION: f64 = 2.4e-4;
/// Angles strictly greater than this are degrees, otherwise radians.
pub const RADIAN_THRESHOLD: f64 = 1.0;
/// Energies strictly below this are keV, otherwise eV.
pub const KEV_THRESHOLD: f64 = 100.0;

/// Normalise a Bragg angle to radians using the magnitude heuristic.
pub fn bragg_angle_to_radians(angle: f64) -> f64 {
    if angle > RADIAN_THRESHOLD {
        angle.to_radians()
    } else {
        angle
    }
}

/// Normalise an energy to eV using the keV heuristic.
pub fn energy_to_ev(energy: f64) -> f64 {
    if energy < KEV_THRESHOLD {
        energy * 1e3
    } else {
        energy
    }
}

/// Photon wavelength [Å] for an energy [eV].
pub fn energy_to_wavelength(energy_ev: f64) -> BeamlineResult<f64> {
    if !(energy_ev > 0.0) || !energy_ev.is_finite() {
        return Err(BeamlineError::Domain(format!(
            "energy must be positive, got {energy_ev}"
        )));
    }
    Ok(HC_EV_ANGSTROM / energy_ev)
}

/// Photon energy [eV] for a wavelength [Å].
pub fn wavelength_to_energy(wavelength_ang: f64) -> BeamlineResult<f64> {
    if !(wavelength_ang > 0.0) || !wavelength_ang.is_finite() {
        return Err(BeamlineError::Domain(format!(
            "wavelength must be positive, got {wavelength_ang}"
        )));
    }
    Ok(HC_EV_ANGSTROM / wavelength_ang)
}
