//! Monochromator energy and beam flux readers.

use crate::device::ProcessVariable;
use crate::error::{BeamlineError, BeamlineResult};
use crate::physics::energy_to_wavelength;
use tracing::info;

/// Current monochromator energy [eV].
pub async fn mono_energy(mono: &dyn ProcessVariable) -> BeamlineResult<f64> {
    let energy_ev = mono
        .get()
        .await
        .map_err(BeamlineError::device(mono.name()))?;
    if !energy_ev.is_finite() || energy_ev <= 0.0 {
        return Err(BeamlineError::Domain(format!(
            "{} reports a non-physical energy {energy_ev}",
            mono.name()
        )));
    }
    Ok(energy_ev)
}

/// Current wavelength [Å] from the monochromator energy.
pub async fn mono_wavelength(mono: &dyn ProcessVariable) -> BeamlineResult<f64> {
    energy_to_wavelength(mono_energy(mono).await?)
}

/// Flux measured by the Keithley-read photodiode [ph/s].
pub async fn keithley_flux(keithley: &dyn ProcessVariable) -> BeamlineResult<f64> {
    let flux = keithley
        .get()
        .await
        .map_err(BeamlineError::device(keithley.name()))?;
    info!(flux, "Keithley flux = {:.3e} ph/s", flux);
    Ok(flux)
}

/// Store `flux` as the beam flux reference used for dose estimates.
///
/// A negative or non-finite value is rejected without writing.
pub async fn set_flux_reference(reference: &dyn ProcessVariable, flux: f64) -> BeamlineResult<()> {
    if !flux.is_finite() || flux < 0.0 {
        return Err(BeamlineError::Validation(format!(
            "flux reference must be a non-negative number, got {flux}"
        )));
    }
    reference
        .put(flux, true)
        .await
        .map_err(BeamlineError::device(reference.name()))?;
    info!(flux, "Flux reference = {:.3e} ph/s", flux);
    Ok(())
}
