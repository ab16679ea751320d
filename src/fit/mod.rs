//! Model fitting.
//!
//! Responsibilities:
//!
//! - template fits of atmospheric parameters and velocities (`template`)
//! - per-exposure velocities and the correct → re-co-add → re-fit loop (`rv`)
//! - least-squares orbit fit and the orbit likelihood (`orbit`)
//! - deterministic seed grids shared by the nonlinear fits (`seed_grid`)

pub mod orbit;
pub mod rv;
pub mod seed_grid;
pub mod template;

pub use orbit::*;
pub use rv::*;
pub use seed_grid::*;
pub use template::*;
