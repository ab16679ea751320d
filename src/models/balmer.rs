//! Balmer-line absorption model for hydrogen-atmosphere white dwarfs.
//!
//! Each line is a Lorentzian absorption on a unit continuum:
//!
//! ```text
//! F(λ) = 1 - D(teff) * γ² / ((λ - λc)² + γ²)
//! D(teff) = d_j * exp(-0.5 * ((log10 teff - p_j) / 0.18)²),  p_j ≈ 4.08..4.14
//! γ(logg) = γ_j * 10^(0.25 * (logg - 8))
//! λc = λ_rest * sqrt((1 + v/c) / (1 - v/c))
//! ```
//!
//! Line depth peaks near 12 600 K and falls off on both sides, which reproduces
//! the familiar hot/cool ambiguity of Balmer-line fitting. The peak shifts a
//! little along the series, so the line ratios still separate the two
//! branches. Width tracks pressure broadening through logg.
//!
//! Observed and model fluxes are both normalised per line with a linear
//! continuum through the two edge regions of the line window, so a wide
//! Lorentzian wing inside an edge region does not bias the comparison.

use nalgebra::{DMatrix, DVector};

use crate::domain::BalmerLine;
use crate::error::AppError;
use crate::math::solve_least_squares;
use crate::spectrum::{Spectrum, doppler_factor};

/// Width of the depth-versus-temperature curve (dex).
const DEPTH_WIDTH_LOGTEFF: f64 = 0.18;

/// Per-line strength: peak depth, logg=8 half-width (Å) and the log10 teff of
/// maximum depth. Higher series members peak slightly hotter.
struct LineStrength {
    depth: f64,
    gamma: f64,
    peak_logteff: f64,
}

fn line_strength(line: &BalmerLine) -> LineStrength {
    let (depth, gamma, peak_logteff) = match line.name {
        "a" => (0.45, 18.0, 4.08),
        "b" => (0.55, 25.0, 4.09),
        "g" => (0.55, 20.0, 4.10),
        "d" => (0.50, 16.0, 4.11),
        "e" => (0.45, 12.0, 4.12),
        "z" => (0.40, 9.0, 4.13),
        "n" => (0.35, 7.0, 4.14),
        _ => (0.30, 5.0, 4.15),
    };
    LineStrength { depth, gamma, peak_logteff }
}

pub fn line_depth(line: &BalmerLine, teff: f64) -> f64 {
    let s = line_strength(line);
    let z = (teff.max(1.0).log10() - s.peak_logteff) / DEPTH_WIDTH_LOGTEFF;
    s.depth * (-0.5 * z * z).exp()
}

pub fn line_width(line: &BalmerLine, logg: f64) -> f64 {
    line_strength(line).gamma * 10f64.powf(0.25 * (logg - 8.0))
}

/// Un-normalised model flux (unit continuum) for one line.
pub fn line_flux(wavelength: f64, line: &BalmerLine, teff: f64, logg: f64, rv: f64) -> f64 {
    let centre = line.centre * doppler_factor(rv);
    let gamma = line_width(line, logg);
    let dx = wavelength - centre;
    1.0 - line_depth(line, teff) * gamma * gamma / (dx * dx + gamma * gamma)
}

/// Model flux across a whole spectrum: product of all line profiles.
pub fn model_flux(wavelength: &[f64], lines: &[BalmerLine], teff: f64, logg: f64, rv: f64) -> Vec<f64> {
    wavelength
        .iter()
        .map(|&wl| {
            lines
                .iter()
                .map(|line| line_flux(wl, line, teff, logg, rv))
                .product()
        })
        .collect()
}

/// One line window of observed data, continuum-normalised. Only pixels with
/// positive inverse variance are kept.
#[derive(Debug, Clone)]
pub struct NormalizedLine {
    pub line: BalmerLine,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    blue_edge: Vec<usize>,
    red_edge: Vec<usize>,
}

impl NormalizedLine {
    /// Continuum-normalised model on this window.
    pub fn model(&self, teff: f64, logg: f64, rv: f64) -> Vec<f64> {
        let raw: Vec<f64> = self
            .wavelength
            .iter()
            .map(|&wl| line_flux(wl, &self.line, teff, logg, rv))
            .collect();

        let side = |idx: &[usize]| -> (f64, f64) {
            let n = idx.len() as f64;
            let wl = idx.iter().map(|&i| self.wavelength[i]).sum::<f64>() / n;
            let fl = idx.iter().map(|&i| raw[i]).sum::<f64>() / n;
            (wl, fl)
        };
        let (wb, fb) = side(&self.blue_edge);
        let (wr, fr) = side(&self.red_edge);
        let slope = if wr > wb { (fr - fb) / (wr - wb) } else { 0.0 };

        raw.iter()
            .zip(self.wavelength.iter())
            .map(|(&f, &wl)| {
                let cont = fb + slope * (wl - wb);
                if cont > 0.0 { f / cont } else { f }
            })
            .collect()
    }

    /// Weighted residuals `(data - model) * sqrt(ivar)` appended to `out`.
    pub fn push_residuals(&self, teff: f64, logg: f64, rv: f64, out: &mut Vec<f64>) {
        let model = self.model(teff, logg, rv);
        for i in 0..self.wavelength.len() {
            out.push((self.flux[i] - model[i]) * self.ivar[i].sqrt());
        }
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }
}

/// Cut and continuum-normalise each line window of `spectrum`.
///
/// Lines whose window is not covered (no usable pixels in one of the edge
/// regions, or a non-positive continuum) are skipped. Fails only when no line
/// survives.
pub fn normalize_lines(spectrum: &Spectrum, lines: &[BalmerLine]) -> Result<Vec<NormalizedLine>, AppError> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        match normalize_line(spectrum, line) {
            Some(nl) => out.push(nl),
            None => log::debug!("Skipping line {} (window not covered).", line.name),
        }
    }
    if out.is_empty() {
        return Err(AppError::insufficient(
            "No Balmer line windows are covered by the spectrum.",
        ));
    }
    Ok(out)
}

fn normalize_line(spectrum: &Spectrum, line: &BalmerLine) -> Option<NormalizedLine> {
    let lo = line.centre - line.window;
    let hi = line.centre + line.window;

    let mut wavelength = Vec::new();
    let mut flux = Vec::new();
    let mut ivar = Vec::new();
    for i in 0..spectrum.len() {
        let wl = spectrum.wavelength[i];
        let (fl, iv) = (spectrum.flux[i], spectrum.ivar[i]);
        if wl >= lo && wl <= hi && fl.is_finite() && iv.is_finite() && iv > 0.0 {
            wavelength.push(wl);
            flux.push(fl);
            ivar.push(iv);
        }
    }

    let blue_edge: Vec<usize> = (0..wavelength.len())
        .filter(|&i| wavelength[i] <= lo + line.edge)
        .collect();
    let red_edge: Vec<usize> = (0..wavelength.len())
        .filter(|&i| wavelength[i] >= hi - line.edge)
        .collect();
    if blue_edge.is_empty() || red_edge.is_empty() {
        return None;
    }

    // Weighted straight-line continuum through both edge regions.
    let fit_idx: Vec<usize> = blue_edge.iter().chain(red_edge.iter()).copied().collect();
    let mut x = DMatrix::<f64>::zeros(fit_idx.len(), 2);
    let mut y = DVector::<f64>::zeros(fit_idx.len());
    for (row, &i) in fit_idx.iter().enumerate() {
        let sw = ivar[i].sqrt();
        x[(row, 0)] = sw;
        x[(row, 1)] = (wavelength[i] - line.centre) * sw;
        y[row] = flux[i] * sw;
    }
    let beta = solve_least_squares(&x, &y)?;

    let mut norm_flux = Vec::with_capacity(wavelength.len());
    let mut norm_ivar = Vec::with_capacity(wavelength.len());
    for i in 0..wavelength.len() {
        let cont = beta[0] + beta[1] * (wavelength[i] - line.centre);
        if !(cont > 0.0) {
            return None;
        }
        norm_flux.push(flux[i] / cont);
        norm_ivar.push(ivar[i] * cont * cont);
    }

    Some(NormalizedLine {
        line: *line,
        wavelength,
        flux: norm_flux,
        ivar: norm_ivar,
        blue_edge,
        red_edge,
    })
}

/// Concatenated weighted residuals over all normalised lines.
pub fn line_residuals(lines: &[NormalizedLine], teff: f64, logg: f64, rv: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.wavelength.len()).sum());
    for nl in lines {
        nl.push_residuals(teff, logg, rv, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LineSet;

    #[test]
    fn depth_peaks_near_twelve_thousand_kelvin() {
        let hb = LineSet::Core.lines()[2];
        let peak = line_depth(&hb, 12_600.0);
        assert!(peak > line_depth(&hb, 8_000.0));
        assert!(peak > line_depth(&hb, 25_000.0));
    }

    #[test]
    fn width_grows_with_gravity() {
        let hb = LineSet::Core.lines()[2];
        assert!(line_width(&hb, 8.5) > line_width(&hb, 7.5));
    }

    #[test]
    fn perfect_model_gives_zero_residuals() {
        let lines = LineSet::Core.lines();
        let wavelength: Vec<f64> = (0..5400).map(|i| 3600.0 + i as f64).collect();
        let flux: Vec<f64> = model_flux(&wavelength, lines, 15_000.0, 8.0, 0.0)
            .iter()
            .zip(wavelength.iter())
            .map(|(f, wl)| f * (2.0 + wl * 1e-4))
            .collect();
        let spectrum = Spectrum {
            ivar: vec![1.0; wavelength.len()],
            wavelength,
            flux,
        };
        let normalized = normalize_lines(&spectrum, lines).unwrap();
        assert_eq!(normalized.len(), 4);
        let r = line_residuals(&normalized, 15_000.0, 8.0, 0.0);
        let rms = (r.iter().map(|v| v * v).sum::<f64>() / r.len() as f64).sqrt();
        assert!(rms < 0.05, "rms={rms}");
    }

    #[test]
    fn uncovered_spectrum_is_rejected() {
        let spectrum = Spectrum {
            wavelength: vec![8000.0, 8001.0],
            flux: vec![1.0, 1.0],
            ivar: vec![1.0, 1.0],
        };
        assert!(normalize_lines(&spectrum, LineSet::Core.lines()).is_err());
    }
}
