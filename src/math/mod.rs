//! Numerical building blocks: interpolation, least squares, optimisers and
//! descriptive statistics.

pub mod interp;
pub mod lm;
pub mod ols;
pub mod optimize;
pub mod stats;

pub use interp::*;
pub use lm::*;
pub use ols::*;
pub use optimize::*;
pub use stats::*;
