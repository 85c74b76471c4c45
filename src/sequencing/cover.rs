//! Detector cover open/close.

use super::actuate::{actuate_until_in_position, ActuatorCommand, PollPolicy};
use crate::device::{ProcessVariable, PvActuator, StatusFlag};
use crate::error::BeamlineResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The detector's protective cover.
///
/// `status` reads 1 while the cover is open.
pub struct DetectorCover {
    close_cmd: Arc<dyn ProcessVariable>,
    open_cmd: Arc<dyn ProcessVariable>,
    status: Arc<dyn ProcessVariable>,
}

impl DetectorCover {
    /// Wire the cover's close/open command PVs and its position status.
    pub fn new(
        close_cmd: Arc<dyn ProcessVariable>,
        open_cmd: Arc<dyn ProcessVariable>,
        status: Arc<dyn ProcessVariable>,
    ) -> Self {
        Self {
            close_cmd,
            open_cmd,
            status,
        }
    }

    /// Close the cover and wait until the status leaves "open".
    pub async fn close(
        &self,
        policy: PollPolicy,
        cancel: Option<&CancellationToken>,
    ) -> BeamlineResult<()> {
        let actuator = PvActuator::new(
            "detector_cover.close",
            Arc::clone(&self.close_cmd),
            Arc::clone(&self.status),
            StatusFlag::NotEquals(1.0),
        );
        let command = ActuatorCommand::new("detector_cover.close", 1.0, policy);
        actuate_until_in_position(&actuator, &command, cancel).await
    }

    /// Open the cover and wait until the status reads "open".
    pub async fn open(
        &self,
        policy: PollPolicy,
        cancel: Option<&CancellationToken>,
    ) -> BeamlineResult<()> {
        let actuator = PvActuator::new(
            "detector_cover.open",
            Arc::clone(&self.open_cmd),
            Arc::clone(&self.status),
            StatusFlag::Equals(1.0),
        );
        let command = ActuatorCommand::new("detector_cover.open", 1.0, policy);
        actuate_until_in_position(&actuator, &command, cancel).await
    }
}
