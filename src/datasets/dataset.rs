//! 1D spectrum datasets.
//!
//! A [`SpectrumDataset`] holds, per reconstructed-energy bin:
//!
//! - observed counts `n_i`
//! - exposure `ε_i` (effective area × livetime, cm² s)
//! - expected background counts `b_i`
//! - a safe-range mask
//!
//! With a bound source model the predicted counts are
//! `μ_i = b_i + ε_i ∫_bin dN/dE dE` and the fit statistic is the summed Cash
//! statistic over the masked bins.

use crate::domain::EnergyEdges;
use crate::error::AppError;
use crate::math::cash;
use crate::models::{integral_with_values, ModelHandle, SpectralModel};

#[derive(Debug, Clone)]
pub struct SpectrumDataset {
    pub name: String,
    pub instrument: String,
    edges: EnergyEdges,
    counts: Vec<f64>,
    exposure: Vec<f64>,
    background: Vec<f64>,
    mask_safe: Vec<bool>,
    models: Option<ModelHandle>,
}

/// Summary numbers for one dataset (used by reports).
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub name: String,
    pub instrument: String,
    pub n_bins: usize,
    pub n_bins_safe: usize,
    pub counts: f64,
    pub background: f64,
    pub excess: f64,
    pub e_min: f64,
    pub e_max: f64,
    pub stat_sum: Option<f64>,
}

impl SpectrumDataset {
    pub fn new(
        name: impl Into<String>,
        instrument: impl Into<String>,
        edges: EnergyEdges,
        counts: Vec<f64>,
        exposure: Vec<f64>,
        background: Vec<f64>,
    ) -> Result<Self, AppError> {
        let name = name.into();
        let n = edges.n_bins();
        for (label, values) in [("counts", &counts), ("exposure", &exposure), ("background", &background)] {
            if values.len() != n {
                return Err(AppError::new(
                    2,
                    format!(
                        "Dataset '{name}': {label} has {} bins, energy axis has {n}.",
                        values.len()
                    ),
                ));
            }
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AppError::new(
                    2,
                    format!("Dataset '{name}': {label} must be finite and >= 0."),
                ));
            }
        }

        Ok(Self {
            name,
            instrument: instrument.into(),
            edges,
            counts,
            exposure,
            background,
            mask_safe: vec![true; n],
            models: None,
        })
    }

    pub fn with_mask_safe(mut self, mask: Vec<bool>) -> Result<Self, AppError> {
        if mask.len() != self.edges.n_bins() {
            return Err(AppError::new(
                2,
                format!("Dataset '{}': mask length does not match energy axis.", self.name),
            ));
        }
        self.mask_safe = mask;
        Ok(self)
    }

    pub fn edges(&self) -> &EnergyEdges {
        &self.edges
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn exposure(&self) -> &[f64] {
        &self.exposure
    }

    pub fn background(&self) -> &[f64] {
        &self.background
    }

    pub fn mask_safe(&self) -> &[bool] {
        &self.mask_safe
    }

    /// Bind a model to this dataset, replacing any previous binding.
    pub fn set_models(&mut self, model: &ModelHandle) {
        self.models = Some(model.clone());
    }

    pub fn models(&self) -> Option<&ModelHandle> {
        self.models.as_ref()
    }

    fn require_model(&self) -> Result<&ModelHandle, AppError> {
        self.models
            .as_ref()
            .ok_or_else(|| AppError::new(2, format!("Dataset '{}' has no model assigned.", self.name)))
    }

    /// Predicted source counts per bin for `model` (no background).
    pub fn npred_signal_with(&self, model: &SpectralModel) -> Vec<f64> {
        let values = model.values();
        self.edges
            .bins()
            .zip(&self.exposure)
            .map(|((lo, hi), &exp)| exp * integral_with_values(model.kind, lo, hi, &values))
            .collect()
    }

    /// Predicted total counts per bin for `model`.
    pub fn npred_with(&self, model: &SpectralModel) -> Vec<f64> {
        self.npred_signal_with(model)
            .into_iter()
            .zip(&self.background)
            .map(|(s, &b)| s + b)
            .collect()
    }

    /// Cash statistic per bin (masked bins contribute 0).
    pub fn stat_array_with(&self, model: &SpectralModel) -> Vec<f64> {
        self.npred_with(model)
            .into_iter()
            .zip(&self.counts)
            .zip(&self.mask_safe)
            .map(|((mu, &n), &safe)| if safe { cash(n, mu) } else { 0.0 })
            .collect()
    }

    pub fn stat_sum_with(&self, model: &SpectralModel) -> f64 {
        self.stat_array_with(model).iter().sum()
    }

    /// Summed Cash statistic with the bound model.
    pub fn stat_sum(&self) -> Result<f64, AppError> {
        let handle = self.require_model()?;
        let model = handle.borrow();
        Ok(self.stat_sum_with(&model.spectral))
    }

    /// Safe bins whose centre lies in `[lo, hi)`.
    pub fn bins_in(&self, lo: f64, hi: f64) -> Vec<usize> {
        (0..self.edges.n_bins())
            .filter(|&i| self.mask_safe[i])
            .filter(|&i| {
                let c = self.edges.center(i);
                c >= lo && c < hi
            })
            .collect()
    }

    pub fn total_counts(&self) -> f64 {
        self.masked_sum(&self.counts)
    }

    pub fn total_background(&self) -> f64 {
        self.masked_sum(&self.background)
    }

    fn masked_sum(&self, values: &[f64]) -> f64 {
        values
            .iter()
            .zip(&self.mask_safe)
            .filter(|(_, safe)| **safe)
            .map(|(v, _)| v)
            .sum()
    }

    pub fn info(&self) -> DatasetInfo {
        let counts = self.total_counts();
        let background = self.total_background();
        DatasetInfo {
            name: self.name.clone(),
            instrument: self.instrument.clone(),
            n_bins: self.edges.n_bins(),
            n_bins_safe: self.mask_safe.iter().filter(|m| **m).count(),
            counts,
            background,
            excess: counts - background,
            e_min: self.edges.e_min(),
            e_max: self.edges.e_max(),
            stat_sum: self.stat_sum().ok(),
        }
    }
}
