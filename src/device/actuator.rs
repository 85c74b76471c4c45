//! PV-backed actuators.
//!
//! Most beamline actuators are a command PV plus a readback flag, e.g. the
//! detector cover's `Cmd:Cls` and `Pos-Sts`. [`PvActuator`] pairs the two and
//! turns the raw flag into an [`ActuatorStatus`].

use super::{Actuator, ProcessVariable};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Status reported by an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorStatus {
    /// Still moving or not yet processed
    Pending,
    /// Reached the requested state
    InPosition,
    /// Device reported a fault
    Error,
}

impl ActuatorStatus {
    /// Status name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorStatus::Pending => "Pending",
            ActuatorStatus::InPosition => "InPosition",
            ActuatorStatus::Error => "Error",
        }
    }
}

/// How a raw readback value maps to "in position".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusFlag {
    /// In position when the readback equals the value.
    Equals(f64),
    /// In position when the readback differs from the value.
    NotEquals(f64),
    /// In position when the readback is non-zero.
    Truthy,
    /// In position when the readback is zero.
    Falsy,
}

impl StatusFlag {
    /// Classify a raw readback.
    pub fn classify(&self, raw: f64) -> ActuatorStatus {
        let done = match *self {
            StatusFlag::Equals(v) => raw == v,
            StatusFlag::NotEquals(v) => raw != v,
            StatusFlag::Truthy => raw != 0.0,
            StatusFlag::Falsy => raw == 0.0,
        };
        if done {
            ActuatorStatus::InPosition
        } else {
            ActuatorStatus::Pending
        }
    }
}

/// Command PV + readback PV, with an optional alarm PV that flags faults.
pub struct PvActuator {
    id: String,
    command: Arc<dyn ProcessVariable>,
    readback: Arc<dyn ProcessVariable>,
    done_when: StatusFlag,
    alarm: Option<Arc<dyn ProcessVariable>>,
}

impl PvActuator {
    /// Pair a command PV with the readback that confirms it.
    pub fn new(
        id: impl Into<String>,
        command: Arc<dyn ProcessVariable>,
        readback: Arc<dyn ProcessVariable>,
        done_when: StatusFlag,
    ) -> Self {
        Self {
            id: id.into(),
            command,
            readback,
            done_when,
            alarm: None,
        }
    }

    /// Report [`ActuatorStatus::Error`] whenever `alarm` reads non-zero.
    pub fn with_alarm(mut self, alarm: Arc<dyn ProcessVariable>) -> Self {
        self.alarm = Some(alarm);
        self
    }
}

#[async_trait]
impl Actuator for PvActuator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, requested_state: f64) -> Result<()> {
        self.command.put(requested_state, false).await
    }

    async fn status(&self) -> Result<ActuatorStatus> {
        if let Some(alarm) = &self.alarm {
            if alarm.get().await? != 0.0 {
                return Ok(ActuatorStatus::Error);
            }
        }
        let raw = self.readback.get().await?;
        Ok(self.done_when.classify(raw))
    }
}
