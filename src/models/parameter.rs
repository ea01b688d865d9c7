//! Model parameters.
//!
//! Spectral amplitudes are ~1e-11 while indices are ~2, so the optimiser never
//! sees raw values: each free parameter is expressed as `factor × scale`, with
//! `scale` chosen by [`Parameter::autoscale`] so that factors are O(1).

use serde::{Deserialize, Serialize};

/// A single named model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    /// 1σ uncertainty from the last fit (0 until a covariance is available).
    #[serde(default)]
    pub error: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Parameter {
    pub fn new(name: &str, value: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            error: 0.0,
            min: None,
            max: None,
            frozen: false,
            scale: 1.0,
        }
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set `scale` to the power of ten of the current value (1 for zero).
    pub fn autoscale(&mut self) {
        let v = self.value.abs();
        self.scale = if v > 0.0 && v.is_finite() {
            10f64.powf(v.log10().floor())
        } else {
            1.0
        };
    }

    pub fn factor(&self) -> f64 {
        self.value / self.scale
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.set_value(factor * self.scale);
    }

    /// Set the value, clipped to the parameter bounds.
    pub fn set_value(&mut self, value: f64) {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        self.value = v;
    }

    pub fn is_free(&self) -> bool {
        !self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoscale_makes_factor_order_one() {
        let mut p = Parameter::new("amplitude", 3.23e-11, "cm-2 s-1 TeV-1");
        p.autoscale();
        assert!((p.scale - 1e-11).abs() < 1e-24);
        assert!((p.factor() - 3.23).abs() < 1e-9);

        p.set_factor(4.0);
        assert!((p.value - 4e-11).abs() < 1e-24);
    }

    #[test]
    fn set_value_respects_bounds() {
        let mut p = Parameter {
            max: Some(10.0),
            ..Parameter::new("norm", 1.0, "").with_min(0.0)
        };
        p.set_value(-3.0);
        assert_eq!(p.value, 0.0);
        p.set_value(30.0);
        assert_eq!(p.value, 10.0);
    }

    #[test]
    fn zero_value_scales_to_one() {
        let mut p = Parameter::new("beta", 0.0, "");
        p.autoscale();
        assert_eq!(p.scale, 1.0);
    }
}
