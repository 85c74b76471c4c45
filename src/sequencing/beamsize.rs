//! Compound refractive lens (CRL) beam size selection.
//!
//! The transfocator holds four vertical and four horizontal lens groups,
//! each moved by writing 1 to its `in` or `out` command. Beam sizes are
//! named by plane and index: `V0`/`V1`, `H0`/`H1`; index 0 is the
//! unfocused beam.

use crate::device::ProcessVariable;
use crate::error::{BeamlineError, BeamlineResult};
use crate::limits::CRL_MIN_ENERGY_EV;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Vertical beam size option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalSize {
    /// All vertical lenses out
    V0,
    /// `vs` and `v1b` in
    V1,
}

/// Horizontal beam size option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalSize {
    /// All horizontal lenses out
    H0,
    /// `h2a`, `h1a` and `h1b` in
    H1,
}

impl FromStr for VerticalSize {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V0" => Ok(Self::V0),
            "V1" => Ok(Self::V1),
            other => Err(BeamlineError::Validation(format!(
                "vertical beam size '{other}' should be one of [\"V0\", \"V1\"]"
            ))),
        }
    }
}

impl FromStr for HorizontalSize {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H0" => Ok(Self::H0),
            "H1" => Ok(Self::H1),
            other => Err(BeamlineError::Validation(format!(
                "horizontal beam size '{other}' should be one of [\"H0\", \"H1\"]"
            ))),
        }
    }
}

impl fmt::Display for VerticalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V0 => "V0",
            Self::V1 => "V1",
        })
    }
}

impl fmt::Display for HorizontalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::H0 => "H0",
            Self::H1 => "H1",
        })
    }
}

/// One lens group with its insert and retract commands.
#[derive(Clone)]
pub struct Lens {
    mv_in: Arc<dyn ProcessVariable>,
    mv_out: Arc<dyn ProcessVariable>,
}

impl Lens {
    /// Wire the insert and retract commands.
    pub fn new(mv_in: Arc<dyn ProcessVariable>, mv_out: Arc<dyn ProcessVariable>) -> Self {
        Self { mv_in, mv_out }
    }

    async fn insert(&self) -> BeamlineResult<()> {
        self.mv_in
            .put(1.0, false)
            .await
            .map_err(BeamlineError::device(self.mv_in.name()))
    }

    async fn retract(&self) -> BeamlineResult<()> {
        self.mv_out
            .put(1.0, false)
            .await
            .map_err(BeamlineError::device(self.mv_out.name()))
    }

    async fn place(&self, inserted: bool) -> BeamlineResult<()> {
        if inserted {
            self.insert().await
        } else {
            self.retract().await
        }
    }
}

/// Transfocator lens groups, named as on the beamline.
#[allow(missing_docs)]
#[derive(Clone)]
pub struct Transfocator {
    pub vs: Lens,
    pub v2a: Lens,
    pub v1a: Lens,
    pub v1b: Lens,
    pub h4a: Lens,
    pub h2a: Lens,
    pub h1a: Lens,
    pub h1b: Lens,
}

impl Transfocator {
    /// Lens positions for `size`, in write order: vs, v2a, v1a, v1b.
    fn vertical_pattern(&self, size: VerticalSize) -> [(&Lens, bool); 4] {
        let inserted = size == VerticalSize::V1;
        [
            (&self.vs, inserted),
            (&self.v2a, false),
            (&self.v1a, false),
            (&self.v1b, inserted),
        ]
    }

    /// Lens positions for `size`, in write order: h4a, h2a, h1a, h1b.
    fn horizontal_pattern(&self, size: HorizontalSize) -> [(&Lens, bool); 4] {
        let inserted = size == HorizontalSize::H1;
        [
            (&self.h4a, false),
            (&self.h2a, inserted),
            (&self.h1a, inserted),
            (&self.h1b, inserted),
        ]
    }
}

/// Select a vertical and horizontal beam size.
///
/// Both options are parsed before anything moves. Below the CRL energy
/// limit the lenses still move, but the operator is warned to defocus with
/// the KB mirrors instead.
pub async fn set_beam_size(
    transfocator: &Transfocator,
    energy_ev: f64,
    vertical: &str,
    horizontal: &str,
) -> BeamlineResult<()> {
    let vertical: VerticalSize = vertical.parse()?;
    let horizontal: HorizontalSize = horizontal.parse()?;

    if energy_ev < CRL_MIN_ENERGY_EV {
        warn!(
            energy_ev,
            "Warning: For energies < 9 keV, use KB mirrors to defocus, not CRLs"
        );
    }

    for (lens, inserted) in transfocator.vertical_pattern(vertical) {
        lens.place(inserted).await?;
    }
    for (lens, inserted) in transfocator.horizontal_pattern(horizontal) {
        lens.place(inserted).await?;
    }
    info!(%vertical, %horizontal, "Beam size set");
    Ok(())
}
