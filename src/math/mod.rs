//! Mathematical utilities: Poisson statistics, spectral integration,
//! finite differences and covariance linear algebra.

pub mod diff;
pub mod integrate;
pub mod linalg;
pub mod stats;

pub use integrate::*;
pub use linalg::*;
pub use stats::*;
