//! Abstract control-system devices.
//!
//! The beamline is reached through process variables (PVs): named scalar
//! read/write points owned by the external control system. Sequencing code
//! never resolves PV addresses itself; every device is handed in by the
//! caller as a trait object.
//!
//! # Capability Traits
//!
//! - [`ProcessVariable`] - a single read/write control point
//! - [`Waveform`] - an array-valued control point (lookup-table axes)
//! - [`Actuator`] - something that is commanded once and then reports
//!   whether it has reached the requested state
//! - [`Governor`] - the sample-environment state controller

pub mod actuator;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

pub use actuator::{ActuatorStatus, PvActuator, StatusFlag};

/// A named scalar control point.
#[async_trait]
pub trait ProcessVariable: Send + Sync {
    /// PV name, used in logs and errors.
    fn name(&self) -> &str;

    /// Read the current value.
    async fn get(&self) -> Result<f64>;

    /// Write a value; with `wait` the call returns once the record has processed it.
    async fn put(&self, value: f64, wait: bool) -> Result<()>;
}

/// An array-valued control point.
#[async_trait]
pub trait Waveform: Send + Sync {
    /// PV name, used in logs and errors.
    fn name(&self) -> &str;

    /// Read the whole array.
    async fn get(&self) -> Result<Vec<f64>>;

    /// Replace the whole array.
    async fn put(&self, values: &[f64]) -> Result<()>;
}

/// A device commanded once and then polled for completion.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Device identifier that commands must target.
    fn id(&self) -> &str;

    /// Issue the requested state. Fire-and-forget.
    async fn send(&self, requested_state: f64) -> Result<()>;

    /// Current status as reported by the device.
    async fn status(&self) -> Result<ActuatorStatus>;
}

/// External state machine that moves the sample environment between modes.
#[async_trait]
pub trait Governor: Send + Sync {
    /// True when the governor currently reports `state`.
    async fn is_in(&self, state: &str) -> Result<bool>;

    /// Request a transition and return once the governor has reached it.
    async fn set_state(&self, state: &str) -> Result<()>;
}
