//! Custom error types for the beamline helpers.
//!
//! This module defines the primary error type, `BeamlineError`, shared by the
//! conversion library and the sequencing helpers. Using the `thiserror` crate,
//! it gives every failure a typed variant so callers can branch on the
//! violated condition instead of parsing console text.
//!
//! ## Error Hierarchy
//!
//! - **`Domain`**: invalid mathematical input (arcsine argument outside
//!   `[-1, 1]`, division by zero, zero Miller vector). Conversions never
//!   return NaN; they return this instead.
//! - **`Validation`**: an out-of-range control parameter or an unsupported
//!   option. Raised before any hardware write.
//! - **`SafetyAbort`**: a computed actuator demand change exceeds the safety
//!   bound. No actuation write is issued.
//! - **`Timeout`** / **`Cancelled`**: a poll loop ended before its predicate
//!   was satisfied.
//! - **`ActuatorFault`**: the device itself reported an error status.
//! - **`Device`**: the control system rejected a read or write.
//! - **`PartialActuation`**: a multi-write sequence failed midway; the
//!   variant records whether the earlier write was rolled back.
//! - **`Config`** / **`ConfigValidation`**: loading or validating settings.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the beamline error type.
pub type BeamlineResult<T> = std::result::Result<T, BeamlineError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum BeamlineError {
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Safety abort: adjacent demand difference {delta:.1} exceeds limit {limit:.1}")]
    SafetyAbort { delta: f64, limit: f64 },

    #[error("Timed out after {elapsed:?} waiting for '{device}'")]
    Timeout { device: String, elapsed: Duration },

    #[error("Wait for '{0}' was cancelled")]
    Cancelled(String),

    #[error("Actuator '{0}' reported an error status")]
    ActuatorFault(String),

    #[error("Device error on '{pv}': {source}")]
    Device {
        pv: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Partial actuation on '{device}' (rolled back: {rolled_back}): {source}")]
    PartialActuation {
        device: String,
        rolled_back: bool,
        #[source]
        source: Box<BeamlineError>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),
}

impl BeamlineError {
    /// Builds a closure that tags a device-layer error with the PV it came from.
    pub(crate) fn device(pv: &str) -> impl FnOnce(anyhow::Error) -> BeamlineError + '_ {
        move |source| BeamlineError::Device {
            pv: pv.to_string(),
            source,
        }
    }

    /// True for failures that leave hardware untouched.
    pub fn is_pre_actuation(&self) -> bool {
        matches!(
            self,
            BeamlineError::Domain(_)
                | BeamlineError::Validation(_)
                | BeamlineError::SafetyAbort { .. }
                | BeamlineError::ConfigValidation(_)
        )
    }
}
