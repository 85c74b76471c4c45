//! CLI Entry Point for the FMX beamline helpers
//!
//! Provides command-line access to the geometry conversions:
//! - Bragg angle ↔ photon energy for the DCM
//! - detector distance ↔ edge resolution
//! - energy → wavelength and dose-limited exposure time
//! - beam centre drift against detector distance
//!
//! # Usage
//!
//! ```bash
//! fmx bragg2e 10.5 --cold
//! fmx e2bragg 12.66
//! fmx det2res 200 --energy 12660
//! fmx show-config --config config/fmx.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fmx_daq::beamline::Beamline;
use fmx_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use fmx_daq::logging;
use fmx_daq::physics::{
    beam_center_fit, bragg_angle_to_energy, default_transmission, detector_distance_from_resolution,
    energy_to_bragg_angle, energy_to_wavelength, resolution_from_detector_distance,
    units::energy_to_ev, DoseEstimate, MillerIndices, DEFAULT_TARGET_DOSE_MGY,
};
use fmx_daq::BeamlineResult;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fmx")]
#[command(about = "FMX beamline geometry and dose helpers", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Photon energy [eV] at a DCM Bragg angle (degrees if > 1, else radians)
    Bragg2e {
        /// Bragg angle
        #[arg(allow_negative_numbers = true)]
        angle: f64,

        /// Crystal reflection as h,k,l
        #[arg(long, default_value = "1,1,1", value_parser = parse_miller)]
        miller: MillerIndices,

        /// Apply the LN2-cooled lattice contraction
        #[arg(long)]
        cold: bool,
    },

    /// DCM Bragg angle [deg] for a photon energy (keV if < 100, else eV)
    E2bragg {
        /// Photon energy
        energy: f64,

        /// Crystal reflection as h,k,l
        #[arg(long, default_value = "1,1,1", value_parser = parse_miller)]
        miller: MillerIndices,
    },

    /// Edge resolution [Å] at a detector distance [mm]
    Det2res {
        /// Sample to detector distance [mm]
        distance: f64,

        #[command(flatten)]
        beam: Beam,

        /// Detector diameter [mm]; defaults to the configured detector
        #[arg(long)]
        diameter: Option<f64>,
    },

    /// Detector distance [mm] that puts a resolution [Å] at the detector edge
    Res2det {
        /// Edge resolution [Å]
        resolution: f64,

        #[command(flatten)]
        beam: Beam,

        /// Detector diameter [mm]; defaults to the configured detector
        #[arg(long)]
        diameter: Option<f64>,
    },

    /// X-ray wavelength [Å] for a photon energy (keV if < 100, else eV)
    Wavelength {
        /// Photon energy
        energy: f64,
    },

    /// Exposure time that delivers a dose budget
    Exposure {
        /// Full-beam dose rate [MGy/s]
        #[arg(long)]
        rate: f64,

        /// Attenuator transmission; defaults to the configured table at --energy
        #[arg(long)]
        transmission: Option<f64>,

        /// Photon energy for the transmission table (keV if < 100, else eV)
        #[arg(long)]
        energy: Option<f64>,

        /// Dose budget [MGy]
        #[arg(long, default_value_t = DEFAULT_TARGET_DOSE_MGY)]
        dose: f64,
    },

    /// Fit measured beam centres [px] against detector distance [mm]
    BeamCenter {
        /// Detector distances [mm], comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        distance: Vec<f64>,

        /// Beam centre X [px] at each distance
        #[arg(long, value_delimiter = ',', required = true)]
        x: Vec<f64>,

        /// Beam centre Y [px] at each distance
        #[arg(long, value_delimiter = ',', required = true)]
        y: Vec<f64>,
    },

    /// Print the detected beamline and the effective configuration
    ShowConfig,
}

/// Beam wavelength, given directly or as a photon energy.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Beam {
    /// Wavelength [Å]
    #[arg(long)]
    wavelength: Option<f64>,

    /// Photon energy (keV if < 100, else eV)
    #[arg(long)]
    energy: Option<f64>,
}

impl Beam {
    fn wavelength(&self) -> Result<f64> {
        match (self.wavelength, self.energy) {
            (Some(wavelength), _) => Ok(wavelength),
            (None, Some(energy)) => Ok(energy_to_wavelength(energy_to_ev(energy))?),
            (None, None) => bail!("either --wavelength or --energy is required"),
        }
    }
}

fn parse_miller(s: &str) -> Result<MillerIndices, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [h, k, l] = parts.as_slice() else {
        return Err(format!("expected h,k,l but got '{s}'"));
    };
    let index = |v: &str| v.parse::<i32>().map_err(|e| format!("'{v}': {e}"));
    Ok(MillerIndices::new(index(h)?, index(k)?, index(l)?))
}

/// TOML comment naming the beamline of this host.
fn beamline_banner(detected: BeamlineResult<Beamline>) -> String {
    match detected {
        Ok(beamline) => format!("# beamline: {beamline}"),
        Err(err) => format!("# beamline: unknown ({err})"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&settings.application);

    match cli.command {
        Commands::Bragg2e {
            angle,
            miller,
            cold,
        } => {
            let energy = bragg_angle_to_energy(angle, miller, cold)?;
            println!("{energy:.2} eV");
        }
        Commands::E2bragg { energy, miller } => {
            let angle = energy_to_bragg_angle(energy, miller)?;
            println!("{angle:.4} deg");
        }
        Commands::Det2res {
            distance,
            beam,
            diameter,
        } => {
            let diameter = diameter.unwrap_or(settings.detector.diameter_mm);
            let resolution = resolution_from_detector_distance(distance, beam.wavelength()?, diameter)?;
            println!("{resolution:.3} Å");
        }
        Commands::Res2det {
            resolution,
            beam,
            diameter,
        } => {
            let diameter = diameter.unwrap_or(settings.detector.diameter_mm);
            let distance = detector_distance_from_resolution(resolution, beam.wavelength()?, diameter)?;
            println!("{distance:.1} mm");
        }
        Commands::Wavelength { energy } => {
            let wavelength = energy_to_wavelength(energy_to_ev(energy))?;
            println!("{wavelength:.5} Å");
        }
        Commands::Exposure {
            rate,
            transmission,
            energy,
            dose,
        } => {
            let transmission = match (transmission, energy, &settings.attenuator.lut) {
                (Some(t), _, _) => t,
                (None, Some(e), Some(lut)) => default_transmission(energy_to_ev(e), lut),
                (None, Some(_), None) => bail!("no attenuator table configured; pass --transmission"),
                (None, None, _) => 1.0,
            };
            let estimate = DoseEstimate::new(rate, transmission)?;
            let seconds = estimate.exposure_time_for_dose(dose)?;
            println!(
                "{seconds:.3} s at transmission {transmission:.3} ({:.4} MGy/s)",
                estimate.rate_mgy_per_s()
            );
        }
        Commands::BeamCenter { distance, x, y } => {
            let fit = beam_center_fit(&distance, &x, &y)?;
            println!(
                "x = {:.6} * dz + {:.2} px (rms {:.3})",
                fit.x.slope, fit.x.intercept, fit.x.rms_residual
            );
            println!(
                "y = {:.6} * dz + {:.2} px (rms {:.3})",
                fit.y.slope, fit.y.intercept, fit.y.rms_residual
            );
        }
        Commands::ShowConfig => {
            println!("{}", beamline_banner(Beamline::detect()));
            print!("{}", toml::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}
