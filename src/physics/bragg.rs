//! Bragg angle ↔ photon energy for a silicon double-crystal monochromator.

use crate::error::{BeamlineError, BeamlineResult};
use crate::physics::units::{
    bragg_angle_to_radians, energy_to_ev, HC_EV_ANGSTROM, LN2_LATTICE_CORRECTION, SI_LATTICE_A,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest sin θ accepted; sin(180°) rounds to about 1.2e-16, not zero.
const MIN_SIN_THETA: f64 = 1e-12;

/// Miller indices (h, k, l) of the diffracting Si reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MillerIndices {
    /// h
    pub h: i32,
    /// k
    pub k: i32,
    /// l
    pub l: i32,
}

impl MillerIndices {
    /// Si(111), the monochromator's working reflection.
    pub const SI_111: MillerIndices = MillerIndices { h: 1, k: 1, l: 1 };

    /// Build an index triple.
    pub const fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l }
    }

    /// √(h² + k² + l²)
    pub fn norm(&self) -> f64 {
        let (h, k, l) = (f64::from(self.h), f64::from(self.k), f64::from(self.l));
        (h * h + k * k + l * l).sqrt()
    }

    /// Twice the interplanar spacing, 2·d [Å].
    ///
    /// With `cold_second_crystal` the lattice is contracted by
    /// [`LN2_LATTICE_CORRECTION`] (first crystal cooled, second at room
    /// temperature).
    pub fn two_d_spacing(&self, cold_second_crystal: bool) -> BeamlineResult<f64> {
        let norm = self.norm();
        if norm == 0.0 {
            return Err(BeamlineError::Domain(
                "Miller indices must not all be zero".to_string(),
            ));
        }
        let correction = if cold_second_crystal {
            LN2_LATTICE_CORRECTION
        } else {
            0.0
        };
        Ok(2.0 * SI_LATTICE_A * (1.0 - correction) / norm)
    }
}

impl Default for MillerIndices {
    fn default() -> Self {
        Self::SI_111
    }
}

impl fmt::Display for MillerIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Si({}{}{})", self.h, self.k, self.l)
    }
}

/// Photon energy [eV] selected at a Bragg angle.
///
/// `angle` is degrees when greater than 1, radians otherwise.
///
/// # Errors
/// `Domain` when sin θ is not positive (0°, 180°, 360°, or any angle whose
/// sine is negative), since no positive photon energy satisfies it.
pub fn bragg_angle_to_energy(
    angle: f64,
    miller: MillerIndices,
    cold_second_crystal: bool,
) -> BeamlineResult<f64> {
    let two_d = miller.two_d_spacing(cold_second_crystal)?;
    let sin_theta = bragg_angle_to_radians(angle).sin();
    if !(sin_theta >= MIN_SIN_THETA) {
        return Err(BeamlineError::Domain(format!(
            "sin of Bragg angle {angle} is {sin_theta:e}; no positive energy"
        )));
    }
    Ok(HC_EV_ANGSTROM / (two_d * sin_theta))
}

/// Bragg angle [deg] that selects a photon energy.
///
/// `energy` below 100 is read as keV. The cold-crystal correction is not
/// applied here.
pub fn energy_to_bragg_angle(energy: f64, miller: MillerIndices) -> BeamlineResult<f64> {
    let energy_ev = energy_to_ev(energy);
    if !(energy_ev > 0.0) || !energy_ev.is_finite() {
        return Err(BeamlineError::Domain(format!(
            "energy {energy} cannot be converted to a Bragg angle"
        )));
    }
    let two_d = miller.two_d_spacing(false)?;
    let sin_theta = HC_EV_ANGSTROM / two_d / energy_ev;
    if sin_theta.abs() > 1.0 {
        return Err(BeamlineError::Domain(format!(
            "{energy_ev:.1} eV is below the {miller} cutoff of {:.1} eV",
            HC_EV_ANGSTROM / two_d
        )));
    }
    Ok(sin_theta.asin().to_degrees())
}
