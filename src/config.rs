//! Beamline helper configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, optional)
//! 2. Environment variables (prefixed with `FMX_`, sections split by `__`)
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! FMX_APPLICATION__LOG_LEVEL=debug
//! FMX_SEQUENCING__TIMEOUT_MS=60000
//! FMX_BIMORPH__MAX_ADJACENT_DELTA=400
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fmx_daq::config::Settings;
//!
//! let settings = Settings::load_from("config/fmx.toml")?;
//! println!("Log level: {}", settings.application.log_level);
//! # Ok::<(), fmx_daq::error::BeamlineError>(())
//! ```

use crate::error::{BeamlineError, BeamlineResult};
use crate::limits::{ATTENUATOR_MAX_ENERGY_EV, ATTENUATOR_MIN_ENERGY_EV, MAX_ADJACENT_DEMAND_DELTA};
use crate::physics::{LookupTable, DEFAULT_DETECTOR_DIAMETER_MM};
use crate::sequencing::{PollPolicy, StepOptions, DEFAULT_ANNEAL_DWELL};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/fmx.toml";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FMX_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Poll loop defaults for actuator waits
    #[serde(default)]
    pub sequencing: SequencingConfig,
    /// Annealer timing
    #[serde(default)]
    pub annealer: AnnealerConfig,
    /// Detector geometry
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Attenuator calibration
    #[serde(default)]
    pub attenuator: AttenuatorConfig,
    /// Bimorph electrode stepping
    #[serde(default)]
    pub bimorph: BimorphConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencingConfig {
    /// Status poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Wait bound in milliseconds (0 = unbounded)
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Annealer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealerConfig {
    /// Paddle status poll interval in milliseconds
    #[serde(default = "default_annealer_poll_interval")]
    pub poll_interval_ms: u64,
    /// Time the paddle stays in, in seconds
    #[serde(default = "default_dwell")]
    pub dwell_s: f64,
}

/// Detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Active-area diameter in millimetres
    #[serde(default = "default_detector_diameter")]
    pub diameter_mm: f64,
}

/// Attenuator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttenuatorConfig {
    /// Lowest calibrated energy [eV]
    #[serde(default = "default_attenuator_min")]
    pub min_energy_ev: f64,
    /// Highest calibrated energy [eV]
    #[serde(default = "default_attenuator_max")]
    pub max_energy_ev: f64,
    /// Default transmission per energy
    #[serde(default)]
    pub lut: Option<LookupTable>,
}

/// Bimorph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BimorphConfig {
    /// Largest allowed adjacent electrode difference [V]
    #[serde(default = "default_max_adjacent_delta")]
    pub max_adjacent_delta: f64,
    /// Settle time after bank selection in milliseconds
    #[serde(default = "default_bank_settle")]
    pub bank_settle_ms: u64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "FMX".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    500
}

fn default_annealer_poll_interval() -> u64 {
    100
}

fn default_dwell() -> f64 {
    1.0
}

fn default_detector_diameter() -> f64 {
    DEFAULT_DETECTOR_DIAMETER_MM
}

fn default_attenuator_min() -> f64 {
    ATTENUATOR_MIN_ENERGY_EV
}

fn default_attenuator_max() -> f64 {
    ATTENUATOR_MAX_ENERGY_EV
}

fn default_max_adjacent_delta() -> f64 {
    MAX_ADJACENT_DEMAND_DELTA
}

fn default_bank_settle() -> u64 {
    500
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Default for SequencingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            timeout_ms: 0,
        }
    }
}

impl Default for AnnealerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_annealer_poll_interval(),
            dwell_s: default_dwell(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            diameter_mm: default_detector_diameter(),
        }
    }
}

impl Default for AttenuatorConfig {
    fn default() -> Self {
        Self {
            min_energy_ev: default_attenuator_min(),
            max_energy_ev: default_attenuator_max(),
            lut: None,
        }
    }
}

impl Default for BimorphConfig {
    fn default() -> Self {
        Self {
            max_adjacent_delta: default_max_adjacent_delta(),
            bank_settle_ms: default_bank_settle(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> BeamlineResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence (highest first): `FMX_` environment variables, the file,
    /// built-in defaults. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// `Config` if the file or an override cannot be parsed, `ConfigValidation`
    /// if the merged values are inconsistent.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BeamlineResult<Self> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BeamlineResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(BeamlineError::ConfigValidation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.sequencing.poll_interval_ms == 0 || self.annealer.poll_interval_ms == 0 {
            return Err(BeamlineError::ConfigValidation(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if Duration::try_from_secs_f64(self.annealer.dwell_s).is_err() {
            return Err(BeamlineError::ConfigValidation(format!(
                "Invalid annealer dwell_s {}",
                self.annealer.dwell_s
            )));
        }

        if !(self.detector.diameter_mm > 0.0) {
            return Err(BeamlineError::ConfigValidation(format!(
                "Invalid detector diameter_mm {}. Must be > 0",
                self.detector.diameter_mm
            )));
        }

        let att = &self.attenuator;
        if !(att.min_energy_ev > 0.0 && att.min_energy_ev < att.max_energy_ev) {
            return Err(BeamlineError::ConfigValidation(format!(
                "Invalid attenuator energy range {} - {} eV",
                att.min_energy_ev, att.max_energy_ev
            )));
        }

        if !(self.bimorph.max_adjacent_delta > 0.0) {
            return Err(BeamlineError::ConfigValidation(format!(
                "Invalid bimorph max_adjacent_delta {}. Must be > 0",
                self.bimorph.max_adjacent_delta
            )));
        }

        Ok(())
    }

    /// Poll policy for generic actuator waits.
    pub fn poll_policy(&self) -> PollPolicy {
        let policy = PollPolicy::every(Duration::from_millis(self.sequencing.poll_interval_ms));
        match self.sequencing.timeout_ms {
            0 => policy,
            ms => policy.with_timeout(Duration::from_millis(ms)),
        }
    }

    /// Poll policy for the annealer paddle, sharing the generic timeout.
    pub fn annealer_policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_millis(self.annealer.poll_interval_ms),
            ..self.poll_policy()
        }
    }

    /// Annealer dwell time. Settings that fail [`Settings::validate`] fall
    /// back to the default dwell.
    pub fn anneal_dwell(&self) -> Duration {
        Duration::try_from_secs_f64(self.annealer.dwell_s).unwrap_or(DEFAULT_ANNEAL_DWELL)
    }

    /// Electrode stepping options.
    pub fn step_options(&self) -> StepOptions {
        StepOptions {
            bank_settle: Duration::from_millis(self.bimorph.bank_settle_ms),
            max_adjacent_delta: self.bimorph.max_adjacent_delta,
        }
    }
}
