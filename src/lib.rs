//! `wd-rv-summary` library crate.
//!
//! The binary (`wdrv`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - stages are reusable from other drivers (batch scripts, notebooks)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod mass;
pub mod math;
pub mod models;
pub mod period;
pub mod plot;
pub mod render;
pub mod report;
pub mod sampler;
pub mod spectrum;
