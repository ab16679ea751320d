//! Exposure loading: read the blue and red arm of an exposure and merge them.
//!
//! Arms come either as JSON dumps (`ArmSpectrum`) or, with the `fits` feature,
//! straight from the reduction's FITS files (HDU 0 flux, 1 ivar, 3 log10
//! wavelength, 4 wdisp, 5 sky; header metadata on HDU 0). The merged exposure
//! takes blue pixels below the arm break and red pixels above it; metadata
//! comes from the blue arm.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Exposure, ExposureHeader};
use crate::error::AppError;
use crate::io::ingest::ExposureFiles;

/// One spectrograph arm of one exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSpectrum {
    /// Required on the blue arm; ignored on the red arm.
    #[serde(default)]
    pub header: Option<ExposureHeader>,
    pub log_wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    pub wdisp: Vec<f64>,
    pub sky: Vec<f64>,
}

impl ArmSpectrum {
    fn validate(&self, path: &Path) -> Result<(), AppError> {
        let n = self.log_wavelength.len();
        if n == 0 {
            return Err(AppError::data(format!("Arm '{}' has no pixels.", path.display())));
        }
        if [self.flux.len(), self.ivar.len(), self.wdisp.len(), self.sky.len()]
            .iter()
            .any(|&len| len != n)
        {
            return Err(AppError::data(format!(
                "Arm '{}' has arrays of different lengths.",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Load and merge every exposure listed for a target.
pub fn load_exposures(files: &[ExposureFiles], arm_break_wl: f64) -> Result<Vec<Exposure>, AppError> {
    files
        .iter()
        .map(|f| {
            let blue = read_arm(&f.blue)?;
            let red = read_arm(&f.red)?;
            merge_arms(&blue, &red, arm_break_wl).map_err(|e| {
                AppError::new(e.exit_code(), format!("{} ({})", e.message(), f.blue.display()))
            })
        })
        .collect()
}

/// Join two arms at `arm_break_wl` (Å).
pub fn merge_arms(blue: &ArmSpectrum, red: &ArmSpectrum, arm_break_wl: f64) -> Result<Exposure, AppError> {
    let header = blue
        .header
        .clone()
        .ok_or_else(|| AppError::data("Blue arm carries no header metadata."))?;
    let log_break = arm_break_wl.log10();

    let mut exposure = Exposure {
        header,
        log_wavelength: Vec::new(),
        flux: Vec::new(),
        ivar: Vec::new(),
        wdisp: Vec::new(),
        sky: Vec::new(),
        rv: None,
    };
    let mut take = |arm: &ArmSpectrum, keep: &dyn Fn(f64) -> bool| {
        for i in 0..arm.log_wavelength.len() {
            if keep(arm.log_wavelength[i]) {
                exposure.log_wavelength.push(arm.log_wavelength[i]);
                exposure.flux.push(arm.flux[i]);
                exposure.ivar.push(arm.ivar[i]);
                exposure.wdisp.push(arm.wdisp[i]);
                exposure.sky.push(arm.sky[i]);
            }
        }
    };
    take(blue, &|l| l < log_break);
    take(red, &|l| l > log_break);

    if exposure.is_empty() {
        return Err(AppError::data("Merged exposure has no pixels."));
    }
    if exposure.log_wavelength.windows(2).any(|w| w[1] <= w[0]) {
        return Err(AppError::data("Merged exposure wavelengths are not increasing."));
    }
    Ok(exposure)
}

/// Overlap (Å) each arm keeps past the arm break when an exposure is split.
const SPLIT_OVERLAP_WL: f64 = 100.0;

/// Split a merged exposure back into overlapping blue and red arms.
///
/// The blue arm carries the header. `merge_arms` with the same break restores
/// every pixel except one sitting exactly on the break.
pub fn split_arms(exposure: &Exposure, arm_break_wl: f64) -> (ArmSpectrum, ArmSpectrum) {
    let blue_max = (arm_break_wl + SPLIT_OVERLAP_WL).log10();
    let red_min = (arm_break_wl - SPLIT_OVERLAP_WL).log10();
    let pick = |keep: &dyn Fn(f64) -> bool, header: Option<ExposureHeader>| {
        let idx: Vec<usize> = (0..exposure.len()).filter(|&i| keep(exposure.log_wavelength[i])).collect();
        let take = |v: &[f64]| idx.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        ArmSpectrum {
            header,
            log_wavelength: take(&exposure.log_wavelength),
            flux: take(&exposure.flux),
            ivar: take(&exposure.ivar),
            wdisp: take(&exposure.wdisp),
            sky: take(&exposure.sky),
        }
    };
    (
        pick(&|l| l <= blue_max, Some(exposure.header.clone())),
        pick(&|l| l >= red_min, None),
    )
}

fn read_arm(path: &Path) -> Result<ArmSpectrum, AppError> {
    let name = path.to_string_lossy().to_ascii_lowercase();
    let arm = if name.ends_with(".json") {
        read_arm_json(path)?
    } else if name.ends_with(".fits") || name.ends_with(".fit") || name.ends_with(".fits.gz") {
        read_arm_fits(path)?
    } else {
        return Err(AppError::input(format!(
            "Unsupported exposure file '{}' (expected .json or .fits).",
            path.display()
        )));
    };
    arm.validate(path)?;
    Ok(arm)
}

/// Read a JSON arm dump.
pub fn read_arm_json(path: &Path) -> Result<ArmSpectrum, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open exposure '{}': {e}", path.display())))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| AppError::data(format!("Invalid exposure JSON '{}': {e}", path.display())))
}

/// Write a JSON arm dump (used by `demo` to stage its synthetic inputs).
pub fn write_arm_json(path: &Path, arm: &ArmSpectrum) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create exposure '{}': {e}", path.display())))?;
    serde_json::to_writer(std::io::BufWriter::new(file), arm)
        .map_err(|e| AppError::input(format!("Failed to write exposure JSON: {e}")))
}

#[cfg(feature = "fits")]
fn read_arm_fits(path: &Path) -> Result<ArmSpectrum, AppError> {
    use fitsio::FitsFile;

    let fits_err = |e: fitsio::errors::Error| AppError::data(format!("FITS error in '{}': {e}", path.display()));

    let mut fptr = FitsFile::open(path)
        .map_err(|e| AppError::input(format!("Failed to open exposure '{}': {e}", path.display())))?;

    let mut image = |idx: usize| -> Result<Vec<f64>, AppError> {
        let hdu = fptr.hdu(idx).map_err(fits_err)?;
        hdu.read_image(&mut fptr).map_err(fits_err)
    };
    let flux = image(0)?;
    let ivar = image(1)?;
    let log_wavelength = image(3)?;
    let wdisp = image(4)?;
    let sky = image(5)?;

    let primary = fptr.primary_hdu().map_err(fits_err)?;
    let mut key = |name: &str| -> Result<f64, AppError> {
        primary.read_key::<f64>(&mut fptr, name).map_err(fits_err)
    };
    let tai_beg = key("TAI-BEG")?;
    let mjd = key("MJD")?;
    let airmass = key("AIRMASS")?;
    let helio_rv = key("HELIO_RV")?;
    let az = key("AZ")?;
    let alt = key("ALT")?;
    let ra = key("RA")?;
    let dec = key("DEC")?;
    let gaia_source_id = primary
        .read_key::<i64>(&mut fptr, "G_EDR3")
        .ok()
        .or_else(|| {
            primary
                .read_key::<String>(&mut fptr, "G_EDR3")
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
        });

    Ok(ArmSpectrum {
        header: Some(ExposureHeader {
            tai_beg,
            mjd,
            airmass,
            helio_rv,
            az,
            alt,
            ra,
            dec,
            gaia_source_id,
        }),
        log_wavelength,
        flux,
        ivar,
        wdisp,
        sky,
    })
}

#[cfg(not(feature = "fits"))]
fn read_arm_fits(path: &Path) -> Result<ArmSpectrum, AppError> {
    Err(AppError::input(format!(
        "Cannot read '{}': FITS support is not compiled in (rebuild with `--features fits`).",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm(min_wl: f64, max_wl: f64, n: usize, flux: f64, header: bool) -> ArmSpectrum {
        let lo = min_wl.log10();
        let step = (max_wl.log10() - lo) / (n - 1) as f64;
        ArmSpectrum {
            header: header.then(|| ExposureHeader {
                tai_beg: 5.0e9,
                mjd: 59000.0,
                airmass: 1.2,
                helio_rv: 10.0,
                az: 120.0,
                alt: 60.0,
                ra: 150.0,
                dec: 2.0,
                gaia_source_id: Some(42),
            }),
            log_wavelength: (0..n).map(|i| lo + step * i as f64).collect(),
            flux: vec![flux; n],
            ivar: vec![1.0; n],
            wdisp: vec![1.0; n],
            sky: vec![0.0; n],
        }
    }

    #[test]
    fn merge_splits_at_the_arm_break() {
        let blue = arm(3600.0, 6300.0, 300, 1.0, true);
        let red = arm(5800.0, 9000.0, 300, 2.0, false);
        let exp = merge_arms(&blue, &red, 6000.0).unwrap();
        let wl = exp.wavelength();
        for (w, f) in wl.iter().zip(&exp.flux) {
            let expected = if *w < 6000.0 { 1.0 } else { 2.0 };
            assert_eq!(*f, expected, "pixel at {w}");
        }
        assert!(exp.log_wavelength.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(exp.header.gaia_source_id, Some(42));
        assert!(exp.rv.is_none());
    }

    #[test]
    fn split_then_merge_restores_the_exposure() {
        let blue = arm(3600.0, 5990.0, 200, 1.0, true);
        let red = arm(6010.0, 9000.0, 200, 2.0, false);
        let exp = merge_arms(&blue, &red, 6000.0).unwrap();

        let (b, r) = split_arms(&exp, 6000.0);
        assert!(b.header.is_some() && r.header.is_none());
        assert!(b.log_wavelength.len() + r.log_wavelength.len() >= exp.len());
        assert_eq!(merge_arms(&b, &r, 6000.0).unwrap(), exp);
    }

    #[test]
    fn merge_requires_blue_header() {
        let blue = arm(3600.0, 6300.0, 50, 1.0, false);
        let red = arm(5800.0, 9000.0, 50, 2.0, false);
        assert_eq!(merge_arms(&blue, &red, 6000.0).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn json_arm_survives_disk() {
        let dir = std::env::temp_dir().join(format!("wdrv-arms-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("blue.json");
        let a = arm(3600.0, 6300.0, 20, 1.5, true);
        write_arm_json(&path, &a).unwrap();
        assert_eq!(read_arm(&path).unwrap(), a);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = read_arm(Path::new("spectrum.txt")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
