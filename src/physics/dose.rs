//! Linear dose and exposure-time estimates.
//!
//! The full-beam dose rate comes from an external absorbed-dose calculation
//! (RADDOSE-3D or a reference table); here it is only scaled by attenuator
//! transmission and integrated over time.

use crate::error::{BeamlineError, BeamlineResult};

/// Dose that halves diffraction intensity for most crystals, the usual budget [MGy].
pub const DEFAULT_TARGET_DOSE_MGY: f64 = 10.0;

/// Dose rate at the sample for one attenuator setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseEstimate {
    full_beam_rate_mgy_per_s: f64,
    transmission: f64,
}

impl DoseEstimate {
    /// `full_beam_rate_mgy_per_s` is the rate at transmission 1.
    pub fn new(full_beam_rate_mgy_per_s: f64, transmission: f64) -> BeamlineResult<Self> {
        if !(full_beam_rate_mgy_per_s > 0.0) || !full_beam_rate_mgy_per_s.is_finite() {
            return Err(BeamlineError::Domain(format!(
                "dose rate must be positive, got {full_beam_rate_mgy_per_s} MGy/s"
            )));
        }
        if !(transmission > 0.0 && transmission <= 1.0) {
            return Err(BeamlineError::Domain(format!(
                "transmission must be within (0, 1], got {transmission}"
            )));
        }
        Ok(Self {
            full_beam_rate_mgy_per_s,
            transmission,
        })
    }

    /// Attenuated dose rate [MGy/s].
    pub fn rate_mgy_per_s(&self) -> f64 {
        self.full_beam_rate_mgy_per_s * self.transmission
    }

    /// Dose accumulated over `exposure_s` seconds [MGy].
    pub fn dose_mgy(&self, exposure_s: f64) -> f64 {
        self.rate_mgy_per_s() * exposure_s.max(0.0)
    }

    /// Exposure time that delivers `target_mgy` [s].
    pub fn exposure_time_for_dose(&self, target_mgy: f64) -> BeamlineResult<f64> {
        if !(target_mgy > 0.0) || !target_mgy.is_finite() {
            return Err(BeamlineError::Domain(format!(
                "target dose must be positive, got {target_mgy} MGy"
            )));
        }
        Ok(target_mgy / self.rate_mgy_per_s())
    }
}
