//! Energy lookup tables.
//!
//! Beamline motors and the attenuator carry per-energy setpoint tables. Values
//! between samples are linearly interpolated and values outside the table are
//! clamped to the end samples (the `numpy.interp` convention the tables were
//! calibrated with).

use crate::error::{BeamlineError, BeamlineResult};
use serde::{Deserialize, Serialize};

/// Sampled (x, y) table with strictly increasing x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct LookupTable {
    x: Vec<f64>,
    y: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawTable {
    energy: Vec<f64>,
    position: Vec<f64>,
}

impl From<LookupTable> for RawTable {
    fn from(table: LookupTable) -> Self {
        Self {
            energy: table.x,
            position: table.y,
        }
    }
}

impl TryFrom<RawTable> for LookupTable {
    type Error = BeamlineError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        LookupTable::new(raw.energy, raw.position)
    }
}

impl LookupTable {
    /// Build a table; `x` must be non-empty, strictly increasing and as long as `y`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> BeamlineResult<Self> {
        if x.len() != y.len() {
            return Err(BeamlineError::Validation(format!(
                "energy and position must have the same number of points ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(BeamlineError::Validation(
                "lookup table must have at least one point".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(BeamlineError::Validation(
                "lookup table values must be finite".to_string(),
            ));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BeamlineError::Validation(
                "lookup table energies must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { x, y })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Energy axis.
    pub fn energies(&self) -> &[f64] {
        &self.x
    }

    /// Position axis, one value per energy.
    pub fn positions(&self) -> &[f64] {
        &self.y
    }

    /// Always false; empty tables are rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Interpolated value at `x`.
    pub fn interp(&self, x: f64) -> f64 {
        let last = self.x.len() - 1;
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[last] {
            return self.y[last];
        }
        // First sample strictly greater than x; in 1..=last here.
        let hi = self.x.partition_point(|&xi| xi <= x);
        let lo = hi - 1;
        let t = (x - self.x[lo]) / (self.x[hi] - self.x[lo]);
        self.y[lo] + t * (self.y[hi] - self.y[lo])
    }
}

/// Attenuator transmission that keeps the beam-viewing scintillator out of saturation.
pub fn default_transmission(energy_ev: f64, table: &LookupTable) -> f64 {
    table.interp(energy_ev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LookupTable {
        LookupTable::new(vec![6000.0, 12000.0, 18000.0], vec![0.01, 0.1, 0.4]).unwrap()
    }

    #[test]
    fn test_interpolates_between_samples() {
        let lut = table();
        assert!((lut.interp(9000.0) - 0.055).abs() < 1e-12);
        assert!((lut.interp(12000.0) - 0.1).abs() < 1e-12);
        assert!((lut.interp(15000.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_clamps_outside_table() {
        let lut = table();
        assert_eq!(lut.interp(5000.0), 0.01);
        assert_eq!(lut.interp(25000.0), 0.4);
        assert_eq!(default_transmission(25000.0, &lut), 0.4);
    }

    #[test]
    fn test_single_point_table() {
        let lut = LookupTable::new(vec![12660.0], vec![0.2]).unwrap();
        assert_eq!(lut.interp(7000.0), 0.2);
        assert_eq!(lut.interp(20000.0), 0.2);
    }

    #[test]
    fn test_rejects_bad_tables() {
        assert!(LookupTable::new(vec![1.0, 2.0], vec![1.0]).is_err());
        assert!(LookupTable::new(vec![], vec![]).is_err());
        assert!(LookupTable::new(vec![2.0, 1.0], vec![1.0, 2.0]).is_err());
        assert!(LookupTable::new(vec![1.0, f64::NAN], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<LookupTable, _> =
            toml::from_str("energy = [7000.0, 13000.0]\nposition = [0.05, 0.2]");
        assert_eq!(ok.unwrap().len(), 2);
        let bad: Result<LookupTable, _> =
            toml::from_str("energy = [13000.0, 7000.0]\nposition = [0.05, 0.2]");
        assert!(bad.is_err());
    }
}
