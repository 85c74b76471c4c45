//! Beamline sequences built on the device traits.
//!
//! Every sequence takes its devices as arguments and is built on one wait
//! primitive, [`actuate_and_await`]: command once, then poll until a status
//! predicate holds or the wait is bounded out.

pub mod actuate;
pub mod annealer;
pub mod attenuator;
pub mod beamsize;
pub mod cover;
pub mod electrode;
pub mod energy;
pub mod flux;

pub use actuate::{actuate_and_await, actuate_until_in_position, ActuatorCommand, PollPolicy};
pub use annealer::{
    anneal, Annealer, DEFAULT_ANNEAL_DWELL, GOVERNOR_CRYO_BLOCKED, GOVERNOR_SAMPLE_ALIGNMENT,
};
pub use attenuator::Attenuator;
pub use beamsize::{set_beam_size, HorizontalSize, Lens, Transfocator, VerticalSize};
pub use cover::DetectorCover;
pub use electrode::{step_electrode_influence, Bimorph, BimorphSupply, ElectrodeStep, StepOptions};
pub use energy::{
    set_energy_motors, EnergyMotors, LastGoodPositions, LookupTableStore, FIXED_MOTORS,
    LGP_NAMES, LUT_NAMES, TABULATED_MOTORS,
};
pub use flux::{keithley_flux, mono_energy, mono_wavelength, set_flux_reference};
