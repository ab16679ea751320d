//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - spectral records (`Exposure`, `CoaddSpectrum`) and their headers
//! - template-fit outputs (`SpectralFit`, `ParamEstimate`)
//! - the radial-velocity time series (`RvSeries`)
//! - run configuration (`PipelineConfig`) and the Balmer line sets
//! - physical constants shared by the numerical stages

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;
