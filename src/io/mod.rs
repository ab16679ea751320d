//! Input/output helpers.
//!
//! - CSV table ingest (`ingest`)
//! - exposure arm loading and merging (`arms`)
//! - run exports: summary JSON and RV table (`export`)

pub mod arms;
pub mod export;
pub mod ingest;

pub use arms::*;
pub use export::*;
pub use ingest::*;
