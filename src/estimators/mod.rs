//! Estimators that derive secondary products from fitted datasets.
//!
//! - `flux_points`: per-bin norm fits against the best-fit spectrum (`FluxPointsEstimator`)

pub mod flux_points;

pub use flux_points::*;
