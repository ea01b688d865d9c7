//! Covariance estimation from the curvature of the fit statistic.
//!
//! The statistic is `-2 ln L`, so the observed information is `H / 2` and the
//! parameter covariance is `2 H⁻¹`.
//!
//! Implementation choices:
//! - We first try a Cholesky factorisation (the Hessian at a minimum is SPD).
//! - If that fails (flat directions, numerical noise) we fall back to an SVD
//!   pseudo-inverse with progressively looser tolerances.

use nalgebra::DMatrix;

/// Invert a symmetric matrix, returning `None` if it is too ill-conditioned.
pub fn invert_symmetric(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() != m.ncols() || m.is_empty() {
        return None;
    }
    if m.iter().any(|v| !v.is_finite()) {
        return None;
    }

    if let Some(chol) = m.clone().cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Some(inv);
        }
    }

    let svd = m.clone().svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(inv) = svd.clone().pseudo_inverse(tol) {
            if inv.iter().all(|v| v.is_finite()) {
                return Some(inv);
            }
        }
    }

    None
}

/// Covariance matrix from the Hessian of a `-2 ln L` statistic.
pub fn covariance_from_hessian(hessian: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let n = hessian.len();
    if n == 0 || hessian.iter().any(|row| row.len() != n) {
        return None;
    }
    let h = DMatrix::from_fn(n, n, |i, j| hessian[i][j]);
    invert_symmetric(&h).map(|inv| inv * 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covariance_of_diagonal_hessian() {
        // stat = (x/σx)² + (y/σy)²  ->  H = diag(2/σx², 2/σy²)
        let h = vec![vec![2.0 / 4.0, 0.0], vec![0.0, 2.0 / 9.0]];
        let cov = covariance_from_hessian(&h).unwrap();
        assert!((cov[(0, 0)] - 4.0).abs() < 1e-10);
        assert!((cov[(1, 1)] - 9.0).abs() < 1e-10);
        assert!(cov[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_uses_pseudo_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let inv = invert_symmetric(&m).unwrap();
        assert!(inv.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_ragged_input() {
        assert!(covariance_from_hessian(&[vec![1.0, 0.0]]).is_none());
        assert!(covariance_from_hessian(&[]).is_none());
    }
}
