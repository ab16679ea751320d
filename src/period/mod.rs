//! Period search on unevenly sampled RV series.

pub mod lomb_scargle;

pub use lomb_scargle::*;
