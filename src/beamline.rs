//! Which beamline this process controls, derived from the host name.

use crate::error::{BeamlineError, BeamlineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two NSLS-II sector 17-ID beamlines sharing this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Beamline {
    /// Frontier Microfocusing Macromolecular Crystallography
    Fmx,
    /// Automated Macromolecular Crystallography
    Amx,
}

impl Beamline {
    /// Host name of the FMX control computer.
    pub const FMX_HOST: &'static str = "xf17id1-ca1";
    /// Host name of the AMX control computer.
    pub const AMX_HOST: &'static str = "xf17id2-ca1";

    /// Map a control host name to its beamline.
    ///
    /// Only the two `-ca1` machines are recognised; anything else is a
    /// validation error.
    pub fn from_hostname(host: &str) -> BeamlineResult<Self> {
        match host {
            Self::FMX_HOST => Ok(Beamline::Fmx),
            Self::AMX_HOST => Ok(Beamline::Amx),
            other => Err(BeamlineError::Validation(format!(
                "host '{other}' is not a beamline control machine; run on {} or {}",
                Self::FMX_HOST,
                Self::AMX_HOST
            ))),
        }
    }

    /// Beamline of the machine this process runs on.
    pub fn detect() -> BeamlineResult<Self> {
        let host = hostname::get()
            .map_err(|e| BeamlineError::Validation(format!("cannot read host name: {e}")))?;
        Self::from_hostname(&host.to_string_lossy())
    }

    /// Short uppercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Beamline::Fmx => "FMX",
            Beamline::Amx => "AMX",
        }
    }
}

impl fmt::Display for Beamline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
