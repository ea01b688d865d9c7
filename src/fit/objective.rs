//! The joint fit statistic as an `argmin` problem.
//!
//! The optimiser works on a flat vector of *factors*, one per free parameter
//! across all distinct models bound to the collection. A factor vector is
//! turned into model values with `value = factor × scale`.
//!
//! Evaluation never touches the shared handles: the objective holds value
//! snapshots of the models, so the fitter writes best-fit values back exactly
//! once, after the optimiser returns.

use argmin::core::{CostFunction, Error};

use crate::datasets::Datasets;
use crate::error::AppError;
use crate::models::{ModelHandle, SpectralModel};

/// One free parameter: `(model index, parameter index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeParameter {
    pub model: usize,
    pub parameter: usize,
}

#[derive(Debug, Clone)]
pub struct JointObjective<'a> {
    datasets: &'a Datasets,
    models: Vec<SpectralModel>,
    dataset_model: Vec<usize>,
    free: Vec<FreeParameter>,
}

impl<'a> JointObjective<'a> {
    /// Build the objective from the models currently bound to `datasets`.
    ///
    /// `handles` must be the distinct bound models (see [`Datasets::models`]).
    pub fn new(datasets: &'a Datasets, handles: &[ModelHandle]) -> Result<Self, AppError> {
        let mut dataset_model = Vec::with_capacity(datasets.len());
        for ds in datasets {
            let bound = ds
                .models()
                .ok_or_else(|| AppError::new(2, format!("Dataset '{}' has no model assigned.", ds.name)))?;
            let idx = handles
                .iter()
                .position(|h| ModelHandle::ptr_eq(h, bound))
                .ok_or_else(|| AppError::new(4, format!("Model of dataset '{}' is not tracked.", ds.name)))?;
            dataset_model.push(idx);
        }

        let models: Vec<SpectralModel> = handles.iter().map(|h| h.borrow().spectral.clone()).collect();
        let free = models
            .iter()
            .enumerate()
            .flat_map(|(m, model)| {
                model
                    .free_indices()
                    .into_iter()
                    .map(move |p| FreeParameter { model: m, parameter: p })
            })
            .collect();

        Ok(Self {
            datasets,
            models,
            dataset_model,
            free,
        })
    }

    pub fn free(&self) -> &[FreeParameter] {
        &self.free
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    /// Current factors of the free parameters.
    pub fn initial_factors(&self) -> Vec<f64> {
        self.free
            .iter()
            .map(|f| self.models[f.model].parameters[f.parameter].factor())
            .collect()
    }

    pub fn scales(&self) -> Vec<f64> {
        self.free
            .iter()
            .map(|f| self.models[f.model].parameters[f.parameter].scale)
            .collect()
    }

    /// Model snapshots with `factors` applied (bounds are respected).
    pub fn models_at(&self, factors: &[f64]) -> Vec<SpectralModel> {
        let mut models = self.models.clone();
        for (f, &x) in self.free.iter().zip(factors) {
            models[f.model].parameters[f.parameter].set_factor(x);
        }
        models
    }

    /// Joint Cash statistic at `factors`.
    pub fn stat(&self, factors: &[f64]) -> f64 {
        let models = self.models_at(factors);
        self.datasets
            .iter()
            .zip(&self.dataset_model)
            .map(|(ds, &m)| ds.stat_sum_with(&models[m]))
            .sum()
    }
}

impl CostFunction for JointObjective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    /// Non-finite statistics map to `+inf` so the simplex moves away from them.
    fn cost(&self, factors: &Self::Param) -> Result<Self::Output, Error> {
        let value = self.stat(factors);
        if value.is_finite() {
            Ok(value)
        } else {
            Ok(f64::INFINITY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::SpectrumDataset;
    use crate::domain::EnergyEdges;
    use crate::models::SkyModel;

    fn collection() -> (Datasets, ModelHandle) {
        let edges = EnergyEdges::new(vec![1.0, 2.0, 4.0]).unwrap();
        let ds = SpectrumDataset::new("H1", "HESS", edges, vec![50.0, 20.0], vec![1e12, 1e12], vec![1.0, 1.0]).unwrap();
        let mut datasets = Datasets::new(vec![ds]);
        let mut spectral = SpectralModel::power_law(2.0, 1e-11, 1.0);
        for p in &mut spectral.parameters {
            p.autoscale();
        }
        let handle = ModelHandle::new(SkyModel::new("CrabNebula", spectral));
        datasets.set_models(&handle);
        (datasets, handle)
    }

    #[test]
    fn factors_round_trip_to_stat() {
        let (datasets, handle) = collection();
        let objective = JointObjective::new(&datasets, &[handle]).unwrap();
        assert_eq!(objective.n_free(), 2);

        let x0 = objective.initial_factors();
        let direct = datasets.stat_sum().unwrap();
        assert!((objective.stat(&x0) - direct).abs() < 1e-9);
    }

    #[test]
    fn stat_does_not_mutate_shared_model() {
        let (datasets, handle) = collection();
        let objective = JointObjective::new(&datasets, std::slice::from_ref(&handle)).unwrap();
        let _ = objective.stat(&[3.0, 7.0]);
        assert_eq!(handle.borrow().spectral.parameters[0].value, 2.0);
    }
}
