//! Core library for the FMX beamline helpers.
//!
//! This library contains the X-ray geometry conversions, the abstract device
//! traits, and the hardware sequences (detector cover, attenuator, annealer,
//! bimorph electrode stepping, CRL beam size) built on a single
//! command-then-poll primitive. It is used by the `fmx` command-line tool
//! and by beamline control code that supplies real devices.
//!
//! # Module Structure
//!
//! - [`physics`] - pure Bragg, detector, wavelength, lookup-table and dose math
//! - [`device`] - `ProcessVariable`, `Actuator` and `Governor` traits plus mocks
//! - [`sequencing`] - `actuate_and_await` and the beamline sequences
//! - [`config`] - figment-based settings
//! - [`error`] - the `BeamlineError` type

pub mod beamline;
pub mod config;
pub mod device;
pub mod error;
pub mod limits;
pub mod logging;
pub mod physics;
pub mod retry;
pub mod sequencing;

pub use error::{BeamlineError, BeamlineResult};
