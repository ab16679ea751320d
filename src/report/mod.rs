//! Formatted terminal output for a finished run.

mod format;

pub use format::{format_orbit_table, format_run_summary};
