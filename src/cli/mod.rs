//! Command-line parsing for the white-dwarf RV pipeline.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::ResourcePaths;
use crate::domain::PipelineConfig;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wdrv", version, about = "White-dwarf radial-velocity summary pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline for one catalog id (`wdrv <id>` is shorthand for this).
    Run(RunArgs),
    /// Run the pipeline on a synthetic binary, offline.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Catalog id of the target (integer).
    pub catalog_id: String,

    #[command(flatten)]
    pub resources: ResourceArgs,

    /// Skip the Gaia archive (no CMD stage).
    #[arg(long)]
    pub offline: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Input tables and the output location. Unset paths fall back to the
/// `WDRV_*` environment variables (a `.env` file is honoured).
#[derive(Debug, Args, Clone, Default)]
pub struct ResourceArgs {
    /// Directory the lookup table's exposure file names are relative to.
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<PathBuf>,

    /// Exposure lookup table (`catalogid,bluefiles,redfiles`).
    #[arg(long, value_name = "CSV")]
    pub lookup_table: Option<PathBuf>,

    /// Cooling-model grid (`mass,logteff,logg,bp_rp,g_abs`).
    #[arg(long, value_name = "CSV")]
    pub cooling_grid: Option<PathBuf>,

    /// Reference white-dwarf catalog for the CMD background.
    #[arg(long, value_name = "CSV")]
    pub reference_catalog: Option<PathBuf>,

    /// Outputs go to `<output-root>/<id>/`.
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,
}

impl ResourceArgs {
    pub fn to_paths(&self) -> ResourcePaths {
        ResourcePaths {
            data_root: self.data_root.clone().unwrap_or_default(),
            lookup_table: self.lookup_table.clone(),
            cooling_grid: self.cooling_grid.clone(),
            reference_catalog: self.reference_catalog.clone(),
            output_root: self.output_root.clone().unwrap_or_default(),
        }
        .resolve()
    }
}

/// Numeric knobs shared by `run` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct PipelineArgs {
    /// Co-add grid lower bound (Å).
    #[arg(long, default_value_t = 3600.0)]
    pub grid_min_wl: f64,

    /// Co-add grid upper bound (Å).
    #[arg(long, default_value_t = 9000.0)]
    pub grid_max_wl: f64,

    /// Co-add grid size (log-uniform).
    #[arg(long, default_value_t = 6500)]
    pub grid_points: usize,

    /// Blue/red arm join (Å).
    #[arg(long, default_value_t = 6000.0)]
    pub arm_break_wl: f64,

    /// Maximum fit → correct → re-fit passes.
    #[arg(long, default_value_t = 2)]
    pub refine_passes: usize,

    /// Relative teff/logg change that ends the refinement early.
    #[arg(long, default_value_t = 1e-3)]
    pub refine_epsilon: f64,

    /// Lowest trial frequency (cycles/day).
    #[arg(long, default_value_t = 2.0)]
    pub min_frequency: f64,

    /// Highest trial frequency (cycles/day).
    #[arg(long, default_value_t = 30.0)]
    pub max_frequency: f64,

    /// Periodogram oversampling.
    #[arg(long, default_value_t = 100.0)]
    pub samples_per_peak: f64,

    /// Ensemble walkers.
    #[arg(long, default_value_t = 250)]
    pub walkers: usize,

    /// Sampler steps per walker.
    #[arg(long, default_value_t = 1000)]
    pub steps: usize,

    /// Steps discarded as burn-in.
    #[arg(long, default_value_t = 500)]
    pub burn_in: usize,

    /// Keep every n-th step after burn-in.
    #[arg(long, default_value_t = 5)]
    pub thin: usize,

    /// Posterior-predictive curves drawn in the posterior figure.
    #[arg(long, default_value_t = 100)]
    pub predictive_draws: usize,

    /// Posterior draws pushed through the M2 inversion.
    #[arg(long, default_value_t = 1000)]
    pub mass_samples: usize,

    /// Primary mass (M☉); skips the cooling-grid lookup.
    #[arg(long, value_name = "MSUN")]
    pub m1: Option<f64>,

    /// Random seed for the sampler and the mass inference.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Width of the summary image (px).
    #[arg(long, default_value_t = 3000)]
    pub summary_width: u32,
}

impl PipelineArgs {
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            grid_min_wl: self.grid_min_wl,
            grid_max_wl: self.grid_max_wl,
            grid_points: self.grid_points,
            arm_break_wl: self.arm_break_wl,
            refine_passes: self.refine_passes,
            refine_epsilon: self.refine_epsilon,
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
            samples_per_peak: self.samples_per_peak,
            walkers: self.walkers,
            steps: self.steps,
            burn_in: self.burn_in,
            thin: self.thin,
            predictive_draws: self.predictive_draws,
            mass_samples: self.mass_samples,
            m1_override: self.m1,
            seed: self.seed,
            plot: !self.no_plot,
            plot_width: self.width,
            plot_height: self.height,
            summary_width: self.summary_width,
            ..PipelineConfig::default()
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Catalog id used to name the outputs.
    #[arg(long, default_value_t = 1)]
    pub catalog_id: u64,

    /// Outputs go to `<output-root>/<id>/`.
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Injected period (hours).
    #[arg(long, default_value_t = 3.5)]
    pub period_hours: f64,

    /// Injected semi-amplitude (km/s).
    #[arg(long, default_value_t = 150.0)]
    pub k: f64,

    /// Injected systemic velocity (km/s).
    #[arg(long, default_value_t = 20.0)]
    pub gamma: f64,

    /// Number of synthetic exposures.
    #[arg(long, default_value_t = 20)]
    pub exposures: usize,

    /// Time span of the exposures (days).
    #[arg(long, default_value_t = 3.0)]
    pub baseline_days: f64,

    /// Continuum signal-to-noise per pixel.
    #[arg(long, default_value_t = 40.0)]
    pub snr: f64,

    /// Injected effective temperature (K).
    #[arg(long, default_value_t = 15000.0)]
    pub teff: f64,

    /// Injected surface gravity (dex).
    #[arg(long, default_value_t = 8.0)]
    pub logg: f64,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_reference_config() {
        let cli = Cli::parse_from(["wdrv", "run", "123"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.catalog_id, "123");
        assert!(!args.offline);
        let config = args.pipeline.to_config();
        let reference = PipelineConfig::default();
        assert_eq!(config.grid_points, reference.grid_points);
        assert_eq!(config.walkers, reference.walkers);
        assert_eq!(config.samples_per_peak, reference.samples_per_peak);
        assert_eq!(config.m1_override, None);
        assert!(config.plot);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["wdrv", "demo", "--walkers", "32", "--m1", "0.6", "--no-plot", "--k", "90"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.k, 90.0);
        let config = args.pipeline.to_config();
        assert_eq!(config.walkers, 32);
        assert_eq!(config.m1_override, Some(0.6));
        assert!(!config.plot);
    }
}
