//! Spectral line-profile models.
//!
//! Models are implemented as small, pure functions so that fitting code can stay
//! generic over parameter vectors.

pub mod balmer;

pub use balmer::*;
