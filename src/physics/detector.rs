//! Detector distance ↔ recordable resolution at the detector edge.
//!
//! Geometry: a flat detector of diameter `D` centred on the beam at distance
//! `z` records scattering up to `2θ = atan(D / 2z)`; Bragg's law then gives
//! the resolution `λ / (2 sin θ)`.

use crate::error::{BeamlineError, BeamlineResult};
use serde::{Deserialize, Serialize};

/// Eiger 16M detector height [mm].
pub const DEFAULT_DETECTOR_DIAMETER_MM: f64 = 327.8;

/// Recordable resolution [Å] at the edge of a detector at `distance_mm`.
pub fn resolution_from_detector_distance(
    distance_mm: f64,
    wavelength_ang: f64,
    diameter_mm: f64,
) -> BeamlineResult<f64> {
    if !(distance_mm > 0.0) {
        return Err(BeamlineError::Domain(format!(
            "detector distance must be positive, got {distance_mm} mm"
        )));
    }
    check_positive("wavelength", wavelength_ang)?;
    check_positive("detector diameter", diameter_mm)?;

    let two_theta = (0.5 * diameter_mm / distance_mm).atan();
    Ok(wavelength_ang / (2.0 * (0.5 * two_theta).sin()))
}

/// Detector distance [mm] that puts `resolution_ang` at the detector edge.
pub fn detector_distance_from_resolution(
    resolution_ang: f64,
    wavelength_ang: f64,
    diameter_mm: f64,
) -> BeamlineResult<f64> {
    check_positive("resolution", resolution_ang)?;
    check_positive("wavelength", wavelength_ang)?;
    check_positive("detector diameter", diameter_mm)?;

    let sin_theta = wavelength_ang / (2.0 * resolution_ang);
    if sin_theta > 1.0 {
        return Err(BeamlineError::Domain(format!(
            "resolution {resolution_ang} Å is below the λ/2 limit of {:.4} Å",
            wavelength_ang / 2.0
        )));
    }
    let tan_two_theta = (2.0 * sin_theta.asin()).tan();
    // 2θ = π/2 makes the tangent blow up; tan ≤ 0 means the edge is behind the sample.
    if !tan_two_theta.is_finite() || tan_two_theta <= 0.0 || tan_two_theta.abs() > 1e15 {
        return Err(BeamlineError::Domain(format!(
            "resolution {resolution_ang} Å needs a scattering angle of 90° or more"
        )));
    }
    Ok(0.5 * diameter_mm / tan_two_theta)
}

fn check_positive(what: &str, value: f64) -> BeamlineResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(BeamlineError::Domain(format!(
            "{what} must be positive, got {value}"
        )))
    }
}

/// A detector placement with the beam wavelength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorGeometry {
    /// Sample to detector distance [mm].
    pub distance_mm: f64,
    /// Detector diameter [mm].
    #[serde(default = "default_diameter")]
    pub diameter_mm: f64,
    /// X-ray wavelength [Å].
    pub wavelength_ang: f64,
}

fn default_diameter() -> f64 {
    DEFAULT_DETECTOR_DIAMETER_MM
}

impl DetectorGeometry {
    /// Geometry for the default detector.
    pub fn new(distance_mm: f64, wavelength_ang: f64) -> Self {
        Self {
            distance_mm,
            diameter_mm: DEFAULT_DETECTOR_DIAMETER_MM,
            wavelength_ang,
        }
    }

    /// Resolution at the detector edge.
    pub fn edge_resolution(&self) -> BeamlineResult<f64> {
        resolution_from_detector_distance(self.distance_mm, self.wavelength_ang, self.diameter_mm)
    }

    /// The same detector and wavelength moved to reach `resolution_ang`.
    pub fn at_resolution(&self, resolution_ang: f64) -> BeamlineResult<Self> {
        let distance_mm =
            detector_distance_from_resolution(resolution_ang, self.wavelength_ang, self.diameter_mm)?;
        Ok(Self {
            distance_mm,
            ..*self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_equal_to_diameter() {
        // atan(0.5) ≈ 0.4636 rad
        let res = resolution_from_detector_distance(327.8, 1.0, DEFAULT_DETECTOR_DIAMETER_MM).unwrap();
        let expected = 1.0 / (2.0 * (0.5 * 0.5f64.atan()).sin());
        assert!((res - expected).abs() < 1e-12);
        assert!((res - 2.176).abs() < 1e-3, "got {res}");

        let back = detector_distance_from_resolution(res, 1.0, DEFAULT_DETECTOR_DIAMETER_MM).unwrap();
        assert!((back - 327.8).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_distance_is_domain_error() {
        assert!(resolution_from_detector_distance(0.0, 1.0, 327.8).is_err());
        assert!(resolution_from_detector_distance(-100.0, 1.0, 327.8).is_err());
    }

    #[test]
    fn test_resolution_below_half_wavelength() {
        let err = detector_distance_from_resolution(0.4, 1.0, 327.8).unwrap_err();
        assert!(matches!(err, BeamlineError::Domain(_)));
    }

    #[test]
    fn test_right_angle_is_domain_error() {
        // λ/(2r) = sin(45°) puts 2θ at exactly 90°.
        let r = 1.0 / (2.0 * std::f64::consts::FRAC_PI_4.sin());
        assert!(detector_distance_from_resolution(r, 1.0, 327.8).is_err());
    }

    #[test]
    fn test_geometry_helpers() {
        let geometry = DetectorGeometry::new(200.0, 0.979);
        let res = geometry.edge_resolution().unwrap();
        let moved = geometry.at_resolution(res).unwrap();
        assert!((moved.distance_mm - 200.0).abs() < 1e-9);
        assert_eq!(moved.diameter_mm, DEFAULT_DETECTOR_DIAMETER_MM);
    }
}
