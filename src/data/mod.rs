//! Synthetic observation data.
//!
//! - `simulate`: instrument presets and Poisson count simulation

pub mod simulate;

pub use simulate::*;
