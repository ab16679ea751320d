//! Primary (visible white dwarf) mass selection.

use serde::Serialize;

use crate::data::cooling::CoolingGrid;
use crate::domain::constants::{DEFAULT_LOW_MASS_PRIMARY, LOW_MASS_LOGG_THRESHOLD};
use crate::error::AppError;

/// Where the primary mass came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum M1Source {
    Override,
    Spectroscopic,
    LowMassFallback,
    Photometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrimaryMass {
    pub mass: f64,
    pub source: M1Source,
}

/// Pick the primary mass.
///
/// Order: explicit override, cooling-grid mass at the spectroscopic teff/logg,
/// the low-mass constant when a loaded grid has no solution at low gravity,
/// then the photometric mass. Without a grid the low-mass constant never
/// applies. Anything else is fatal.
pub fn primary_mass(
    m1_override: Option<f64>,
    cooling: Option<&CoolingGrid>,
    teff: f64,
    logg: f64,
    photometric: Option<f64>,
) -> Result<PrimaryMass, AppError> {
    if let Some(mass) = m1_override {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(AppError::input(format!("--m1 must be positive (got {mass}).")));
        }
        return Ok(PrimaryMass { mass, source: M1Source::Override });
    }

    if let Some(mass) = cooling.and_then(|g| g.mass_from_teff_logg(teff, logg)) {
        return Ok(PrimaryMass { mass, source: M1Source::Spectroscopic });
    }

    if cooling.is_some() && logg <= LOW_MASS_LOGG_THRESHOLD {
        log::warn!("Off the cooling grid at logg={logg:.2}; assuming M1 = {DEFAULT_LOW_MASS_PRIMARY} M☉.");
        return Ok(PrimaryMass {
            mass: DEFAULT_LOW_MASS_PRIMARY,
            source: M1Source::LowMassFallback,
        });
    }

    if let Some(mass) = photometric.filter(|m| m.is_finite() && *m > 0.0) {
        log::warn!("No spectroscopic mass for teff={teff:.0} logg={logg:.2}; using photometric M1 = {mass:.3} M☉.");
        return Ok(PrimaryMass { mass, source: M1Source::Photometric });
    }

    Err(AppError::data(format!(
        "No primary mass available for teff={teff:.0} K, logg={logg:.2} (off the cooling grid, no photometry). Use --m1."
    )))
}
