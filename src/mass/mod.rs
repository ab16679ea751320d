//! Companion-mass inference.
//!
//! - `function`: the binary mass function and its numeric inversion
//! - `primary`: which primary mass to adopt
//! - `inference`: posterior-driven M2 and total-mass estimates

pub mod function;
pub mod inference;
pub mod primary;

pub use function::*;
pub use inference::*;
pub use primary::*;
