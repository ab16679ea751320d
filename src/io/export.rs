//! Run exports: the summary JSON and the per-exposure RV table.
//!
//! Both are meant to be easy to consume in notebooks or downstream scripts.
//! Large arrays (chains, periodogram power, residuals) stay out of the JSON;
//! the SVG artifacts carry those.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::data::{CmdPosition, GaiaSource, GeometricDistance, PhotometricEstimate};
use crate::domain::{Exposure, PipelineConfig, RvVariability, SpectralFit};
use crate::error::AppError;
use crate::fit::{OrbitFit, RefinePass};
use crate::mass::MassInference;
use crate::period::Periodogram;
use crate::sampler::posterior::OrbitPosterior;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExposureCounts {
    pub loaded: usize,
    pub measured: usize,
    /// Epochs left out of the RV series (no usable uncertainty).
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CmdSummary<'a> {
    pub source: &'a GaiaSource,
    pub distance: &'a GeometricDistance,
    pub position: CmdPosition,
    pub photometric: Option<PhotometricEstimate>,
}

/// Convergence of every nonlinear step, in pipeline order.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConvergenceFlags {
    pub template: bool,
    pub refinement_settled: bool,
    pub atmosphere: bool,
    pub exposures_converged: usize,
    pub orbit_lsq: bool,
    pub point_estimate: bool,
}

/// Everything written to `<id>_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub catalog_id: u64,
    pub generated_at: String,
    pub version: &'static str,
    pub config: &'a PipelineConfig,
    pub exposures: ExposureCounts,
    pub refinement: &'a [RefinePass],
    /// Velocity template (core lines) from the last refinement pass.
    pub template: &'a SpectralFit,
    /// Atmospheric parameters from the rest-frame co-add (full line set).
    pub atmosphere: &'a SpectralFit,
    pub variability: Option<RvVariability>,
    pub periodogram: &'a Periodogram,
    pub orbit_lsq: &'a OrbitFit,
    pub posterior: &'a OrbitPosterior,
    pub cmd: Option<CmdSummary<'a>>,
    pub mass: &'a MassInference,
    pub converged: ConvergenceFlags,
    pub artifacts: Vec<String>,
}

/// Current UTC time in RFC 3339, for `generated_at`.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Write the run summary as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &RunSummary<'_>) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON '{}': {e}", path.display())))
}

#[derive(Debug, Serialize)]
struct RvRow {
    mjd: f64,
    rv: f64,
    e_rv: Option<f64>,
    converged: bool,
    airmass: f64,
    helio_rv: f64,
}

/// Write one row per measured exposure (unmeasured ones are skipped).
pub fn write_rv_csv(path: &Path, exposures: &[Exposure]) -> Result<usize, AppError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create RV CSV '{}': {e}", path.display())))?;

    let mut rows = 0;
    for exp in exposures {
        let Some(m) = exp.rv else { continue };
        wtr.serialize(RvRow {
            mjd: exp.header.tai_mjd(),
            rv: m.rv,
            e_rv: m.e_rv,
            converged: m.converged,
            airmass: exp.header.airmass,
            helio_rv: exp.header.helio_rv,
        })
        .map_err(|e| AppError::new(2, format!("Failed to write RV CSV row: {e}")))?;
        rows += 1;
    }
    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush RV CSV '{}': {e}", path.display())))?;
    Ok(rows)
}
