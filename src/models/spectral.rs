//! Parametric spectral models.
//!
//! A [`SpectralModel`] pairs a [`SpectralKind`] with its parameter list and,
//! after a fit, the covariance of its free parameters (used for error bands).

use serde::{Deserialize, Serialize};

use crate::domain::{EnergyRange, SedType, TEV_TO_ERG};
use crate::error::AppError;
use crate::math::{diff, integrate_log_trapezoid, DEFAULT_INTEGRATION_STEPS};
use crate::models::model::{evaluate, integral_analytic, SpectralKind};
use crate::models::parameter::Parameter;

/// Covariance of a subset of a model's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCovariance {
    /// Indices into the model's parameter list.
    pub indices: Vec<usize>,
    /// Row-major square matrix matching `indices`.
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedModel")]
pub struct SpectralModel {
    pub kind: SpectralKind,
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariance: Option<ModelCovariance>,
}

/// Deserialised form of a [`SpectralModel`] before [`SpectralModel::validate`].
#[derive(Deserialize)]
struct UncheckedModel {
    kind: SpectralKind,
    parameters: Vec<Parameter>,
    #[serde(default)]
    covariance: Option<ModelCovariance>,
}

impl TryFrom<UncheckedModel> for SpectralModel {
    type Error = AppError;

    fn try_from(raw: UncheckedModel) -> Result<Self, AppError> {
        let model = Self {
            kind: raw.kind,
            parameters: raw.parameters,
            covariance: raw.covariance,
        };
        model.validate()?;
        Ok(model)
    }
}

impl SpectralModel {
    /// Build a model from explicit parameters, checking names and order.
    pub fn from_parameters(kind: SpectralKind, parameters: Vec<Parameter>) -> Result<Self, AppError> {
        let model = Self {
            kind,
            parameters,
            covariance: None,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check parameter names against the kind, finite values and the covariance shape.
    pub fn validate(&self) -> Result<(), AppError> {
        let expected = self.kind.parameter_names();
        let names: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        if names != expected {
            return Err(AppError::new(
                2,
                format!(
                    "{} expects parameters {:?}, got {:?}.",
                    self.kind.display_name(),
                    expected,
                    names
                ),
            ));
        }
        if let Some(p) = self.parameters.iter().find(|p| !p.value.is_finite()) {
            return Err(AppError::new(2, format!("Model parameter '{}' must be finite.", p.name)));
        }
        if let Some(cov) = &self.covariance {
            let n = cov.indices.len();
            let in_range = cov.indices.iter().all(|&i| i < self.parameters.len());
            let square = cov.matrix.len() == n && cov.matrix.iter().all(|row| row.len() == n);
            if !(in_range && square) {
                return Err(AppError::new(2, "Model covariance does not match its parameters."));
            }
        }
        Ok(())
    }

    pub fn power_law(index: f64, amplitude: f64, reference: f64) -> Self {
        Self {
            kind: SpectralKind::PowerLaw,
            parameters: vec![
                Parameter::new("index", index, ""),
                Parameter::new("amplitude", amplitude, "cm-2 s-1 TeV-1"),
                Parameter::new("reference", reference, "TeV").frozen(),
            ],
            covariance: None,
        }
    }

    pub fn log_parabola(amplitude: f64, reference: f64, alpha: f64, beta: f64) -> Self {
        Self {
            kind: SpectralKind::LogParabola,
            parameters: vec![
                Parameter::new("amplitude", amplitude, "cm-2 s-1 TeV-1"),
                Parameter::new("reference", reference, "TeV").frozen(),
                Parameter::new("alpha", alpha, ""),
                Parameter::new("beta", beta, ""),
            ],
            covariance: None,
        }
    }

    pub fn exp_cutoff_power_law(index: f64, amplitude: f64, reference: f64, lambda: f64) -> Self {
        Self {
            kind: SpectralKind::ExpCutoffPowerLaw,
            parameters: vec![
                Parameter::new("index", index, ""),
                Parameter::new("amplitude", amplitude, "cm-2 s-1 TeV-1"),
                Parameter::new("reference", reference, "TeV").frozen(),
                Parameter::new("lambda_", lambda, "TeV-1").with_min(0.0),
            ],
            covariance: None,
        }
    }

    pub fn meyer_crab() -> Self {
        Self {
            kind: SpectralKind::MeyerCrab,
            parameters: vec![Parameter::new("norm", 1.0, "").with_min(0.0)],
            covariance: None,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Indices of the non-frozen parameters.
    pub fn free_indices(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    /// Freeze every parameter (used when a model only serves as a fixed reference).
    pub fn freeze_all(&mut self) {
        for p in &mut self.parameters {
            p.frozen = true;
        }
    }

    pub fn evaluate(&self, energy: f64) -> f64 {
        evaluate(self.kind, energy, &self.values())
    }

    /// `∫ dN/dE dE` over `[e1, e2]` (cm-2 s-1).
    pub fn integral(&self, e1: f64, e2: f64) -> f64 {
        let values = self.values();
        integral_with_values(self.kind, e1, e2, &values)
    }

    /// `∫ E dN/dE dE` over `[e1, e2]` in erg cm-2 s-1.
    pub fn energy_flux(&self, e1: f64, e2: f64) -> f64 {
        let values = self.values();
        let kind = self.kind;
        integrate_log_trapezoid(|e| e * evaluate(kind, e, &values), e1, e2, 100) * TEV_TO_ERG
    }

    pub fn sed(&self, sed_type: SedType, energy: f64) -> f64 {
        sed_type.from_dnde(energy, self.evaluate(energy))
    }

    /// `dN/dE` and its 1σ error from linear propagation of the covariance.
    ///
    /// Returns a zero error when no covariance is attached.
    pub fn evaluate_error(&self, energy: f64) -> (f64, f64) {
        let value = self.evaluate(energy);
        let Some(cov) = &self.covariance else {
            return (value, 0.0);
        };

        let values = self.values();
        let at: Vec<f64> = cov.indices.iter().map(|&i| values[i]).collect();
        let steps: Vec<f64> = cov.indices.iter().map(|&i| gradient_step(&self.parameters[i])).collect();
        let flux = |x: &[f64]| {
            let mut v = values.clone();
            for (&i, &xi) in cov.indices.iter().zip(x) {
                v[i] = xi;
            }
            evaluate(self.kind, energy, &v)
        };
        let grads = diff::gradient(&flux, &at, &steps);

        let mut var = 0.0;
        for (a, ga) in grads.iter().enumerate() {
            for (b, gb) in grads.iter().enumerate() {
                var += ga * cov.matrix[a][b] * gb;
            }
        }
        (value, var.max(0.0).sqrt())
    }

    /// Sample the model on a log grid: `(energy, sed)` pairs.
    pub fn sample(&self, range: EnergyRange, n: usize, sed_type: SedType) -> Vec<(f64, f64)> {
        range
            .log_grid(n)
            .into_iter()
            .map(|e| (e, self.sed(sed_type, e)))
            .collect()
    }

    /// Sample the 1σ band: `(energy, lower, upper)` in SED units.
    pub fn sample_band(&self, range: EnergyRange, n: usize, sed_type: SedType) -> Vec<(f64, f64, f64)> {
        range
            .log_grid(n)
            .into_iter()
            .map(|e| {
                let (v, err) = self.evaluate_error(e);
                (
                    e,
                    sed_type.from_dnde(e, v - err),
                    sed_type.from_dnde(e, v + err),
                )
            })
            .collect()
    }
}

/// Bin integral with an explicit value vector (avoids re-collecting values in hot loops).
pub fn integral_with_values(kind: SpectralKind, e1: f64, e2: f64, values: &[f64]) -> f64 {
    if let Some(v) = integral_analytic(kind, e1, e2, values) {
        return v;
    }
    integrate_log_trapezoid(|e| evaluate(kind, e, values), e1, e2, DEFAULT_INTEGRATION_STEPS)
}

/// Difference step: a thousandth of the error, or of the value before a fit.
fn gradient_step(p: &Parameter) -> f64 {
    let base = if p.error > 0.0 {
        p.error
    } else if p.value != 0.0 {
        p.value.abs()
    } else {
        p.scale.abs().max(f64::MIN_POSITIVE)
    };
    base * 1e-3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_parameter_order() {
        let params = vec![
            Parameter::new("amplitude", 1e-11, ""),
            Parameter::new("index", 2.0, ""),
            Parameter::new("reference", 1.0, ""),
        ];
        assert!(SpectralModel::from_parameters(SpectralKind::PowerLaw, params).is_err());
    }

    #[test]
    fn short_parameter_list_fails_to_deserialise() {
        let json = r#"{"kind": "log-parabola", "parameters": [{"name": "amplitude", "value": 1e-11}]}"#;
        let err = serde_json::from_str::<SpectralModel>(json).unwrap_err();
        assert!(err.to_string().contains("expects parameters"), "{err}");

        let ok = serde_json::to_string(&SpectralModel::log_parabola(1e-11, 1.0, 2.0, 0.1)).unwrap();
        assert!(serde_json::from_str::<SpectralModel>(&ok).is_ok());
    }

    #[test]
    fn covariance_must_match_parameters() {
        let mut m = SpectralModel::power_law(2.0, 1e-11, 1.0);
        m.covariance = Some(ModelCovariance {
            indices: vec![0, 7],
            matrix: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        });
        assert_eq!(m.validate().unwrap_err().exit_code(), 2);
    }

    #[test]
    fn cutoff_suppresses_high_energies() {
        let pl = SpectralModel::power_law(2.0, 1e-11, 1.0);
        let ecpl = SpectralModel::exp_cutoff_power_law(2.0, 1e-11, 1.0, 0.1);
        ecpl.validate().unwrap();
        let ratio = |e: f64| ecpl.evaluate(e) / pl.evaluate(e);
        assert!((ratio(1.0) - (-0.1f64).exp()).abs() < 1e-12);
        assert!(ratio(20.0) < 0.2);
    }

    #[test]
    fn free_indices_skip_reference() {
        let m = SpectralModel::log_parabola(3e-11, 1.0, 2.5, 0.1);
        assert_eq!(m.free_indices(), vec![0, 2, 3]);
    }

    #[test]
    fn numerical_integral_agrees_with_analytic() {
        let lp = SpectralModel::log_parabola(1e-11, 1.0, 2.0, 0.0);
        let pl = SpectralModel::power_law(2.0, 1e-11, 1.0);
        let a = lp.integral(1.0, 10.0);
        let b = pl.integral(1.0, 10.0);
        assert!(((a - b) / b).abs() < 1e-9);
    }

    #[test]
    fn error_band_scales_with_amplitude_variance() {
        let mut m = SpectralModel::power_law(2.0, 1e-11, 1.0);
        m.parameters[1].error = 1e-12;
        m.covariance = Some(ModelCovariance {
            indices: vec![1],
            matrix: vec![vec![1e-24]],
        });
        let (v, err) = m.evaluate_error(1.0);
        assert!((v - 1e-11).abs() < 1e-24);
        assert!(((err - 1e-12) / 1e-12).abs() < 1e-6);
    }

    #[test]
    fn energy_flux_is_positive() {
        let m = SpectralModel::meyer_crab();
        assert!(m.energy_flux(1.0, 10.0) > 0.0);
    }
}
