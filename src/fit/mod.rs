//! Joint likelihood fitting.
//!
//! Responsibilities:
//!
//! - expose the summed Cash statistic of a collection as an optimiser problem
//! - minimise it over the free parameters of the bound model(s)
//! - write best-fit values, errors and covariance back into the shared models

pub mod fitter;
pub mod objective;

pub use fitter::*;
pub use objective::*;
