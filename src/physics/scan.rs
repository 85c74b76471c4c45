//! Scan analysis: peak finding and straight-line fits.

use crate::error::{BeamlineError, BeamlineResult};
use serde::{Deserialize, Serialize};

/// Highest reading of a scan and the position it was taken at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Motor position at the peak.
    pub position: f64,
    /// Detector reading at the peak.
    pub reading: f64,
}

/// Position of the largest reading.
///
/// Non-finite readings are skipped. On ties the first point wins.
///
/// # Errors
/// `Validation` if the slices differ in length, `Domain` if no reading is finite.
pub fn find_peak(positions: &[f64], readings: &[f64]) -> BeamlineResult<Peak> {
    if positions.len() != readings.len() {
        return Err(BeamlineError::Validation(format!(
            "scan has {} positions but {} readings",
            positions.len(),
            readings.len()
        )));
    }
    positions
        .iter()
        .zip(readings)
        .filter(|(_, r)| r.is_finite())
        .fold(None::<Peak>, |best, (&position, &reading)| match best {
            Some(peak) if peak.reading >= reading => Some(peak),
            _ => Some(Peak { position, reading }),
        })
        .ok_or_else(|| BeamlineError::Domain("scan has no finite readings".to_string()))
}

/// Least-squares line `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Slope.
    pub slope: f64,
    /// Value at x = 0.
    pub intercept: f64,
    /// Root-mean-square residual.
    pub rms_residual: f64,
}

impl LineFit {
    /// Fitted value at `x`.
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least-squares fit of `y` against `x`.
///
/// # Errors
/// - `Validation` if the slices differ in length
/// - `Domain` with fewer than two points, non-finite values, or all `x` equal
pub fn fit_line(x: &[f64], y: &[f64]) -> BeamlineResult<LineFit> {
    if x.len() != y.len() {
        return Err(BeamlineError::Validation(format!(
            "{} x values but {} y values",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(BeamlineError::Domain(
            "a line fit needs at least two points".to_string(),
        ));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(BeamlineError::Domain("fit values must be finite".to_string()));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (sxx, sxy) = x
        .iter()
        .zip(y)
        .fold((0.0, 0.0), |(sxx, sxy), (&xi, &yi)| {
            let dx = xi - mean_x;
            (sxx + dx * dx, sxy + dx * (yi - mean_y))
        });
    if sxx == 0.0 {
        return Err(BeamlineError::Domain(
            "all x values are equal; the slope is undefined".to_string(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let sum_sq = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - (slope * xi + intercept)).powi(2))
        .sum::<f64>();
    Ok(LineFit {
        slope,
        intercept,
        rms_residual: (sum_sq / n).sqrt(),
    })
}

/// Beam centre drift with detector distance, one line per pixel axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamCenterFit {
    /// Beam centre X [px] against distance [mm].
    pub x: LineFit,
    /// Beam centre Y [px] against distance [mm].
    pub y: LineFit,
}

impl BeamCenterFit {
    /// Predicted beam centre (x, y) [px] at a detector distance [mm].
    pub fn at(&self, distance_mm: f64) -> (f64, f64) {
        (self.x.at(distance_mm), self.y.at(distance_mm))
    }
}

/// Fit measured beam centres [px] against detector distance [mm].
pub fn beam_center_fit(
    distance_mm: &[f64],
    center_x: &[f64],
    center_y: &[f64],
) -> BeamlineResult<BeamCenterFit> {
    Ok(BeamCenterFit {
        x: fit_line(distance_mm, center_x)?,
        y: fit_line(distance_mm, center_y)?,
    })
}
