//! Spectral model evaluation for each model kind.
//!
//! Models are implemented as small, pure functions of `(energy, values)` so
//! that fitting and estimation code can stay generic. `values` is the full
//! parameter vector in the order given by [`SpectralKind::parameter_names`].

use serde::{Deserialize, Serialize};

use crate::domain::TEV_TO_ERG;

/// Meyer et al. (2010) Crab polynomial in `log10(E / TeV)`, highest power first.
///
/// Gives `log10(E² dN/dE / (erg cm-2 s-1))`.
pub const MEYER_COEFFICIENTS: [f64; 6] = [-0.00449161, 0.0, 0.0264223, -0.0486683, -0.18261, -10.2708];

/// Concrete spectral shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpectralKind {
    /// `A (E/E0)^-Γ`
    PowerLaw,
    /// `A (E/E0)^(-α - β ln(E/E0))`
    LogParabola,
    /// `A (E/E0)^-Γ exp(-λ E)`
    ExpCutoffPowerLaw,
    /// `norm × Meyer et al. (2010)` Crab reference spectrum.
    MeyerCrab,
}

impl SpectralKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            SpectralKind::PowerLaw => "PowerLaw",
            SpectralKind::LogParabola => "LogParabola",
            SpectralKind::ExpCutoffPowerLaw => "ExpCutoffPowerLaw",
            SpectralKind::MeyerCrab => "MeyerCrab",
        }
    }

    /// Parameter names in evaluation order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            SpectralKind::PowerLaw => &["index", "amplitude", "reference"],
            SpectralKind::LogParabola => &["amplitude", "reference", "alpha", "beta"],
            SpectralKind::ExpCutoffPowerLaw => &["index", "amplitude", "reference", "lambda_"],
            SpectralKind::MeyerCrab => &["norm"],
        }
    }
}

/// Differential flux `dN/dE` in `cm-2 s-1 TeV-1` at `energy` (TeV).
///
/// # Panics
/// Panics if `values` is shorter than `kind.parameter_names().len()`. Callers
/// build `values` from a model of the same kind; deserialised models are
/// checked by [`SpectralModel::validate`](crate::models::SpectralModel::validate).
pub fn evaluate(kind: SpectralKind, energy: f64, values: &[f64]) -> f64 {
    match kind {
        SpectralKind::PowerLaw => {
            let (index, amplitude, reference) = (values[0], values[1], values[2]);
            amplitude * (energy / reference).powf(-index)
        }
        SpectralKind::LogParabola => {
            let (amplitude, reference, alpha, beta) = (values[0], values[1], values[2], values[3]);
            let x = energy / reference;
            amplitude * x.powf(-alpha - beta * x.ln())
        }
        SpectralKind::ExpCutoffPowerLaw => {
            let (index, amplitude, reference, lambda) = (values[0], values[1], values[2], values[3]);
            amplitude * (energy / reference).powf(-index) * (-lambda * energy).exp()
        }
        SpectralKind::MeyerCrab => {
            let norm = values[0];
            let x = energy.log10();
            let log_flux = MEYER_COEFFICIENTS.iter().fold(0.0, |acc, c| acc * x + c);
            // erg cm-2 s-1 -> TeV cm-2 s-1, then divide by E² (TeV²).
            norm * 10f64.powf(log_flux) / TEV_TO_ERG / (energy * energy)
        }
    }
}

/// Analytic `∫ dN/dE dE` over `[e1, e2]` where one exists.
pub fn integral_analytic(kind: SpectralKind, e1: f64, e2: f64, values: &[f64]) -> Option<f64> {
    match kind {
        SpectralKind::PowerLaw => {
            let (index, amplitude, reference) = (values[0], values[1], values[2]);
            let g = 1.0 - index;
            if g.abs() < 1e-10 {
                return Some(amplitude * reference * (e2 / e1).ln());
            }
            Some(amplitude * reference / g * ((e2 / reference).powf(g) - (e1 / reference).powf(g)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_law_at_reference_is_amplitude() {
        let v = evaluate(SpectralKind::PowerLaw, 1.0, &[2.5, 1e-11, 1.0]);
        assert!((v - 1e-11).abs() < 1e-24);
        let v2 = evaluate(SpectralKind::PowerLaw, 10.0, &[2.0, 1e-11, 1.0]);
        assert!((v2 - 1e-13).abs() < 1e-26);
    }

    #[test]
    fn log_parabola_reduces_to_power_law() {
        let lp = evaluate(SpectralKind::LogParabola, 3.0, &[1e-11, 1.0, 2.3, 0.0]);
        let pl = evaluate(SpectralKind::PowerLaw, 3.0, &[2.3, 1e-11, 1.0]);
        assert!(((lp - pl) / pl).abs() < 1e-12);
    }

    #[test]
    fn power_law_integral_matches_closed_form() {
        // ∫_1^10 1e-11 E^-2 dE = 0.9e-11
        let v = integral_analytic(SpectralKind::PowerLaw, 1.0, 10.0, &[2.0, 1e-11, 1.0]).unwrap();
        assert!((v - 0.9e-11).abs() < 1e-24);
    }

    #[test]
    fn meyer_crab_is_in_crab_flux_range_at_one_tev() {
        let dnde = evaluate(SpectralKind::MeyerCrab, 1.0, &[1.0]);
        assert!(dnde > 1e-11 && dnde < 1e-10, "dnde={dnde}");
    }
}
