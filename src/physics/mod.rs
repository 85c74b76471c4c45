//! Pure X-ray physics and geometry conversions.
//!
//! Nothing in this module touches hardware or holds state: identical inputs
//! always give identical outputs, and invalid inputs return
//! [`BeamlineError::Domain`](crate::error::BeamlineError::Domain) instead of NaN.

pub mod bragg;
pub mod detector;
pub mod dose;
pub mod lut;
pub mod scan;
pub mod units;

pub use bragg::{bragg_angle_to_energy, energy_to_bragg_angle, MillerIndices};
pub use detector::{
    detector_distance_from_resolution, resolution_from_detector_distance, DetectorGeometry,
    DEFAULT_DETECTOR_DIAMETER_MM,
};
pub use dose::{DoseEstimate, DEFAULT_TARGET_DOSE_MGY};
pub use lut::{default_transmission, LookupTable};
pub use scan::{beam_center_fit, find_peak, fit_line, BeamCenterFit, LineFit, Peak};
pub use units::{energy_to_wavelength, wavelength_to_energy};
