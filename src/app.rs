//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds the run resources
//! - runs the pipeline
//! - prints the report and writes artifacts

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Command, DemoArgs, RunArgs};
use crate::data::Resources;
use crate::data::synthetic::{SyntheticOrbit, SyntheticStar};
use crate::domain::{Exposure, PipelineConfig};
use crate::error::AppError;

pub mod demo;
pub mod pipeline;

/// Entry point for the `wdrv` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();

    // We want `wdrv <id>` to behave like `wdrv run <id>`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let catalog_id = parse_catalog_id(&args.catalog_id)?;
    let config = args.pipeline.to_config();
    let resources = Resources::load(args.resources.to_paths(), args.offline)?;

    let exposures = pipeline::load_target(&resources, catalog_id, &config)?;
    execute(catalog_id, &exposures, &resources, &config)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = args.pipeline.to_config();
    let setup = demo::DemoSetup {
        catalog_id: args.catalog_id,
        star: SyntheticStar {
            teff: args.teff,
            logg: args.logg,
            snr: args.snr,
            ..SyntheticStar::default()
        },
        orbit: SyntheticOrbit {
            gamma: args.gamma,
            k: args.k,
            period_hours: args.period_hours,
            phi: 0.0,
        },
        n_exposures: args.exposures,
        baseline_days: args.baseline_days,
        seed: config.seed,
    };

    let output_root = args
        .output_root
        .clone()
        .or_else(|| {
            dotenvy::dotenv().ok();
            std::env::var_os(crate::data::resources::ENV_OUTPUT_ROOT).map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("output"));
    let input_dir = std::env::temp_dir().join(format!("wdrv-demo-{}", std::process::id()));

    let result = demo::prepare_demo(&setup, &input_dir, output_root, config.arm_break_wl).and_then(|resources| {
        let exposures = pipeline::load_target(&resources, setup.catalog_id, &config)?;
        execute(setup.catalog_id, &exposures, &resources, &config)
    });
    if let Err(e) = std::fs::remove_dir_all(&input_dir) {
        log::debug!("Could not remove demo inputs '{}': {e}", input_dir.display());
    }
    result
}

fn execute(catalog_id: u64, exposures: &[Exposure], resources: &Resources, config: &PipelineConfig) -> Result<(), AppError> {
    let run = pipeline::run_pipeline(catalog_id, exposures, resources, config)?;

    println!("{}", crate::report::format_run_summary(&run, config));
    if config.plot {
        let plot = crate::plot::render_phase_plot(
            &run.series,
            &run.posterior.mean_orbit(),
            run.posterior.period_hours,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }

    let artifacts = pipeline::render_artifacts(&run, resources)?;
    let dir = pipeline::prepare_output_dir(&resources.paths.output_root, catalog_id)?;
    let written = pipeline::write_outputs(&run, &artifacts, config, &dir)?;
    log::info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(())
}

/// Catalog ids are plain non-negative integers.
pub fn parse_catalog_id(raw: &str) -> Result<u64, AppError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AppError::input(format!("Catalog id must be a non-negative integer (got '{raw}').")))
}

/// Rewrite argv so `wdrv <id>` defaults to `wdrv run <id>`.
///
/// Rules:
/// - `wdrv`                      -> unchanged (clap prints usage, exit 2)
/// - `wdrv <id> ...`             -> `wdrv run <id> ...`
/// - `wdrv --help/--version/-h`  -> unchanged (show top-level help/version)
/// - `wdrv run|demo ...`         -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "run" | "demo");
    if is_subcommand {
        return argv;
    }

    // Anything else (an id, or flags before it) belongs to `run`.
    argv.insert(1, "run".to_string());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_id_becomes_run() {
        assert_eq!(rewrite_args(args(&["wdrv", "4592943353"])), args(&["wdrv", "run", "4592943353"]));
        assert_eq!(
            rewrite_args(args(&["wdrv", "--offline", "12"])),
            args(&["wdrv", "run", "--offline", "12"])
        );
    }

    #[test]
    fn subcommands_and_help_are_untouched() {
        for v in [&["wdrv", "demo"][..], &["wdrv", "run", "5"], &["wdrv", "--help"], &["wdrv"]] {
            assert_eq!(rewrite_args(args(v)), args(v));
        }
    }

    #[test]
    fn non_integer_id_is_an_input_error() {
        assert_eq!(parse_catalog_id(" 0042 ").unwrap(), 42);
        let err = parse_catalog_id("J1234+5678").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(parse_catalog_id("-3").is_err());
    }
}
