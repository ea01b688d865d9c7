//! Finite-difference derivatives through `finitediff`.
//!
//! `finitediff` perturbs every coordinate by √ε. That is far below the
//! round-off of a Cash statistic summed over hundreds of bins, so the helpers
//! here evaluate `f` along `x + c ⊙ u` and differentiate with respect to `u`
//! at zero, with `c = step / √ε`. One perturbation of `u` then moves
//! coordinate `i` by `steps[i]`.

use finitediff::FiniteDiff;

fn stretch(steps: &[f64]) -> Vec<f64> {
    let root = f64::EPSILON.sqrt();
    steps.iter().map(|s| s / root).collect()
}

fn shift(x: &[f64], c: &[f64], u: &[f64]) -> Vec<f64> {
    x.iter().zip(c).zip(u).map(|((x0, ci), ui)| x0 + ci * ui).collect()
}

/// Central-difference gradient of `f` at `x`.
pub fn gradient(f: &dyn Fn(&[f64]) -> f64, x: &[f64], steps: &[f64]) -> Vec<f64> {
    let c = stretch(steps);
    let along = |u: &Vec<f64>| f(&shift(x, &c, u));
    vec![0.0_f64; x.len()]
        .central_diff(&along)
        .into_iter()
        .zip(&c)
        .map(|(g, ci)| g / ci)
        .collect()
}

/// Central-difference Hessian of `f` at `x`, symmetrised.
pub fn hessian(f: &dyn Fn(&[f64]) -> f64, x: &[f64], steps: &[f64]) -> Vec<Vec<f64>> {
    let c = stretch(steps);
    let along = |u: &Vec<f64>| f(&shift(x, &c, u));
    let grad = |u: &Vec<f64>| u.central_diff(&along);
    let mut h = vec![0.0_f64; x.len()].central_hessian(&grad);
    for (i, row) in h.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v /= c[i] * c[j];
        }
    }
    symmetrize(&mut h);
    h
}

/// Average each off-diagonal pair in place.
fn symmetrize(h: &mut [Vec<f64>]) {
    for i in 0..h.len() {
        for j in 0..i {
            let avg = 0.5 * (h[i][j] + h[j][i]);
            h[i][j] = avg;
            h[j][i] = avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A large constant offset mimics the magnitude of a summed statistic.
    fn quadratic(x: &[f64]) -> f64 {
        1e3 + 3.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + x[1] * x[1]
    }

    #[test]
    fn gradient_of_quadratic() {
        let g = gradient(&quadratic, &[1.0, 2.0], &[1e-3, 1e-3]);
        assert!((g[0] - 10.0).abs() < 1e-5, "{g:?}");
        assert!((g[1] - 6.0).abs() < 1e-5, "{g:?}");
    }

    #[test]
    fn hessian_of_quadratic_is_symmetric() {
        let h = hessian(&quadratic, &[1.0, 2.0], &[1e-3, 1e-3]);
        assert!((h[0][0] - 6.0).abs() < 1e-4, "{h:?}");
        assert!((h[1][1] - 2.0).abs() < 1e-4, "{h:?}");
        assert!((h[0][1] - 2.0).abs() < 1e-4, "{h:?}");
        assert_eq!(h[0][1], h[1][0]);
    }

    #[test]
    fn steps_follow_the_coordinate_scale() {
        // Amplitude-like coordinate: the gradient must come back in its own units.
        let f = |x: &[f64]| 2.0 * x[0];
        let g = gradient(&f, &[3e-11], &[1e-14]);
        assert!((g[0] - 2.0).abs() < 1e-6, "{g:?}");

        let symmetric = {
            let mut m = vec![vec![1.0, 2.0], vec![0.0, 3.0]];
            symmetrize(&mut m);
            m
        };
        assert_eq!(symmetric, vec![vec![1.0, 1.0], vec![1.0, 3.0]]);
    }
}
