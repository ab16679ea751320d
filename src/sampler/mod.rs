//! Posterior sampling for the orbit model.

pub mod ensemble;
pub mod posterior;

pub use ensemble::*;
pub use posterior::*;
