//! Spectral array handling: co-addition, Doppler shifts, trailed line
//! profiles and fit-ready views.

pub mod coadd;
pub mod doppler;
pub mod trail;

pub use coadd::*;
pub use doppler::*;
pub use trail::{TrailedLine, TrailedSpectra, trailed_spectra};

use crate::domain::{CoaddSpectrum, Exposure};

/// Linear-wavelength spectrum handed to the template fitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl Spectrum {
    pub fn from_coadd(coadd: &CoaddSpectrum) -> Self {
        Self {
            wavelength: coadd.wavelength(),
            flux: coadd.flux.clone(),
            ivar: coadd.ivar.clone(),
        }
    }

    /// Pixels of `exposure` with `min_wl < λ < max_wl` (strict on both ends).
    pub fn from_exposure_in_range(exposure: &Exposure, min_wl: f64, max_wl: f64) -> Self {
        let mut out = Self {
            wavelength: Vec::new(),
            flux: Vec::new(),
            ivar: Vec::new(),
        };
        for (i, wl) in exposure.wavelength().into_iter().enumerate() {
            if wl > min_wl && wl < max_wl {
                out.wavelength.push(wl);
                out.flux.push(exposure.flux[i]);
                out.ivar.push(exposure.ivar[i]);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExposureHeader;

    #[test]
    fn range_selection_is_strict() {
        let exposure = Exposure {
            header: ExposureHeader {
                tai_beg: 0.0,
                mjd: 0.0,
                airmass: 1.0,
                helio_rv: 0.0,
                az: 0.0,
                alt: 90.0,
                ra: 0.0,
                dec: 0.0,
                gaia_source_id: None,
            },
            log_wavelength: vec![3600f64.log10(), 4000f64.log10(), 9000f64.log10()],
            flux: vec![1.0, 2.0, 3.0],
            ivar: vec![1.0, 1.0, 1.0],
            wdisp: vec![1.0; 3],
            sky: vec![0.0; 3],
            rv: None,
        };
        let s = Spectrum::from_exposure_in_range(&exposure, 3600.0, 9000.0);
        assert_eq!(s.flux, vec![2.0]);
    }
}
