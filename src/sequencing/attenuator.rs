//! Attenuator transmission control.
//!
//! Two attenuators share this interface: the BCU filter set, which raises a
//! `done` flag once the filters have moved, and the RI unit, which does not.

use super::actuate::{actuate_until_in_position, ActuatorCommand, PollPolicy};
use crate::device::{ProcessVariable, PvActuator, StatusFlag};
use crate::error::{BeamlineError, BeamlineResult};
use crate::limits::{
    validate_attenuator_energy, validate_transmission, ATTENUATOR_MAX_ENERGY_EV,
    ATTENUATOR_MIN_ENERGY_EV,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// An attenuator driven by energy/transmission setpoints and a "set" trigger.
pub struct Attenuator {
    name: String,
    energy: Arc<dyn ProcessVariable>,
    transmission: Arc<dyn ProcessVariable>,
    set_trans: Arc<dyn ProcessVariable>,
    done: Option<Arc<dyn ProcessVariable>>,
    energy_range: (f64, f64),
}

impl Attenuator {
    /// Attenuator without a completion flag; the trigger write is awaited instead.
    pub fn new(
        name: impl Into<String>,
        energy: Arc<dyn ProcessVariable>,
        transmission: Arc<dyn ProcessVariable>,
        set_trans: Arc<dyn ProcessVariable>,
    ) -> Self {
        Self {
            name: name.into(),
            energy,
            transmission,
            set_trans,
            done: None,
            energy_range: (ATTENUATOR_MIN_ENERGY_EV, ATTENUATOR_MAX_ENERGY_EV),
        }
    }

    /// Wait on `done` reading 1 after triggering.
    pub fn with_done_flag(mut self, done: Arc<dyn ProcessVariable>) -> Self {
        self.done = Some(done);
        self
    }

    /// Override the calibrated energy range (inclusive, eV).
    pub fn with_energy_range(mut self, min_ev: f64, max_ev: f64) -> Self {
        self.energy_range = (min_ev, max_ev);
        self
    }

    /// Attenuator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the transmission at the monochromator's current energy.
    ///
    /// Nothing is written when the energy is outside the calibrated range or
    /// the transmission is not a fraction. Returns the transmission read back.
    pub async fn set_transmission(
        &self,
        mono_energy: &dyn ProcessVariable,
        transmission: f64,
        policy: PollPolicy,
        cancel: Option<&CancellationToken>,
    ) -> BeamlineResult<f64> {
        let energy_ev = mono_energy
            .get()
            .await
            .map_err(BeamlineError::device(mono_energy.name()))?;
        let (min_ev, max_ev) = self.energy_range;
        validate_attenuator_energy(energy_ev, min_ev, max_ev)?;
        validate_transmission(transmission)?;

        // Only read back by the IOC for diagnostics.
        self.energy
            .put(energy_ev, true)
            .await
            .map_err(BeamlineError::device(self.energy.name()))?;
        self.transmission
            .put(transmission, true)
            .await
            .map_err(BeamlineError::device(self.transmission.name()))?;

        match &self.done {
            Some(done) => {
                let id = format!("{}.set", self.name);
                let actuator = PvActuator::new(
                    id.clone(),
                    Arc::clone(&self.set_trans),
                    Arc::clone(done),
                    StatusFlag::Equals(1.0),
                );
                let command = ActuatorCommand::new(id, 1.0, policy);
                actuate_until_in_position(&actuator, &command, cancel).await?;
            }
            None => self
                .set_trans
                .put(1.0, true)
                .await
                .map_err(BeamlineError::device(self.set_trans.name()))?,
        }

        let readback = self.read_transmission().await?;
        info!(
            attenuator = %self.name,
            "Attenuator = {}, Transmission set to {:.3}",
            self.name,
            readback
        );
        Ok(readback)
    }

    /// Current transmission.
    pub async fn transmission(&self) -> BeamlineResult<f64> {
        let transmission = self.read_transmission().await?;
        info!(
            attenuator = %self.name,
            "Attenuator = {}, Transmission = {:.3}",
            self.name,
            transmission
        );
        Ok(transmission)
    }

    async fn read_transmission(&self) -> BeamlineResult<f64> {
        self.transmission
            .get()
            .await
            .map_err(BeamlineError::device(self.transmission.name()))
    }
}
