//! Poisson likelihood statistics.
//!
//! All fit statistics in this crate are on the `-2 ln L` scale, so that a
//! difference of `n_sigma²` between two hypotheses corresponds to an
//! `n_sigma` (one degree of freedom) interval.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Floor applied to the predicted counts before taking the logarithm.
pub const MU_FLOOR: f64 = 1e-25;

/// Cash statistic for one bin: `2 (mu - n ln mu)`.
///
/// This is the Poisson `-2 ln L` without the model-independent `ln n!` term.
/// A NaN prediction gives NaN rather than being floored.
pub fn cash(n: f64, mu: f64) -> f64 {
    if mu.is_nan() {
        return f64::NAN;
    }
    let mu = mu.max(MU_FLOOR);
    2.0 * (mu - n * mu.ln())
}

/// Convert a test statistic into a (signed) Gaussian significance.
///
/// Negative TS values (best fit below the null) map to a negative significance.
pub fn ts_to_sqrt_ts(ts: f64) -> f64 {
    if !ts.is_finite() {
        return f64::NAN;
    }
    ts.signum() * ts.abs().sqrt()
}

/// p-value of a test statistic under a χ² distribution with `dof` degrees of freedom.
pub fn ts_p_value(ts: f64, dof: f64) -> Option<f64> {
    if !(ts.is_finite() && dof > 0.0) {
        return None;
    }
    let dist = ChiSquared::new(dof).ok()?;
    Some(1.0 - dist.cdf(ts.max(0.0)))
}
