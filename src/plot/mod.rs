//! Terminal plots.

mod ascii;

pub use ascii::render_phase_plot;
