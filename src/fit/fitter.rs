//! Joint maximum-likelihood fitting.
//!
//! Given a collection whose members are bound to one (or a few) shared models,
//! we minimise the summed Cash statistic over all free parameters with a
//! Nelder–Mead simplex (argmin), then:
//!
//! - write the best-fit values back into the shared models, so every dataset
//!   holding the handle sees them
//! - estimate the covariance from a finite-difference Hessian of the statistic
//!   and store parameter errors + covariance on the models
//!
//! The simplex is started from the current parameter values with fixed
//! relative offsets, so a fit on unchanged inputs is deterministic.

use std::fmt;

use argmin::core::{Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::datasets::Datasets;
use crate::error::AppError;
use crate::fit::objective::JointObjective;
use crate::math::{covariance_from_hessian, diff};
use crate::models::{ModelCovariance, ModelHandle};

/// Options controlling the optimiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Maximum simplex iterations per optimisation pass.
    pub max_iters: u64,
    /// Convergence threshold on the standard deviation of the simplex statistics.
    pub tolerance: f64,
    /// Additional passes restarted from the best point with a fresh simplex.
    pub restarts: usize,
    /// Estimate the covariance matrix after the fit.
    pub compute_covariance: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            tolerance: 1e-7,
            restarts: 1,
            compute_covariance: true,
        }
    }
}

/// Value copy of one parameter after the fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub model: String,
    pub name: String,
    pub value: f64,
    pub error: f64,
    pub unit: String,
    pub frozen: bool,
}

/// Immutable record of one fit invocation.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub success: bool,
    pub message: String,
    pub n_iterations: u64,
    /// Joint Cash statistic at the best fit.
    pub total_stat: f64,
    /// All parameters of the fitted models (free and frozen).
    pub parameters: Vec<ParameterSnapshot>,
    /// Covariance of the free parameters in value space (row-major), if computed.
    pub covariance: Option<Vec<Vec<f64>>>,
}

impl FitResult {
    /// Turn a non-converged fit into an error (the pipeline does not retry).
    pub fn ensure_success(&self) -> Result<(), AppError> {
        if self.success {
            Ok(())
        } else {
            Err(AppError::new(4, format!("Fit did not converge: {}", self.message)))
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSnapshot> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OptimizeResult")?;
        writeln!(f)?;
        writeln!(f, "    backend    : nelder-mead (argmin)")?;
        writeln!(f, "    success    : {}", self.success)?;
        writeln!(f, "    message    : {}", self.message)?;
        writeln!(f, "    iterations : {}", self.n_iterations)?;
        writeln!(f, "    total stat : {:.2}", self.total_stat)?;
        writeln!(f, "    covariance : {}", if self.covariance.is_some() { "available" } else { "unavailable" })?;
        Ok(())
    }
}

/// Joint fitter.
#[derive(Debug, Clone, Default)]
pub struct Fit {
    pub options: FitOptions,
}

impl Fit {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }

    /// Fit the bound model(s) to all members of `datasets`.
    ///
    /// Errors on an empty collection, missing model bindings, no free
    /// parameters, or a non-finite starting statistic. Non-convergence is
    /// reported through `FitResult::success`.
    pub fn run(&self, datasets: &Datasets) -> Result<FitResult, AppError> {
        if datasets.is_empty() {
            return Err(AppError::new(3, "Cannot fit an empty dataset collection."));
        }
        if let Some(ds) = datasets.iter().find(|d| d.models().is_none()) {
            return Err(AppError::new(2, format!("Dataset '{}' has no model assigned.", ds.name)));
        }

        let handles = datasets.models();
        for handle in &handles {
            for p in &mut handle.borrow_mut().spectral.parameters {
                p.autoscale();
            }
        }

        let objective = JointObjective::new(datasets, &handles)?;
        if objective.n_free() == 0 {
            return Err(AppError::new(2, "No free parameters to fit."));
        }

        let best = objective.initial_factors();
        let start_stat = objective.stat(&best);
        if !start_stat.is_finite() {
            return Err(AppError::new(
                4,
                format!("Fit statistic is not finite at the starting parameters ({start_stat})."),
            ));
        }
        info!(
            "Fitting {} free parameter(s) on {} dataset(s), start stat = {start_stat:.3}",
            objective.n_free(),
            datasets.len()
        );

        let mut passes = Passes::new(best, start_stat);
        for pass in 0..=self.options.restarts {
            let outcome = self.minimise(&objective, &passes.factors)?;
            debug!(
                "pass {pass}: stat = {:.6} after {} iterations ({})",
                outcome.stat, outcome.iterations, outcome.message
            );
            passes.record(outcome, pass == 0);
            if !passes.converged {
                break;
            }
        }
        let Passes {
            factors: best,
            iterations: n_iterations,
            converged,
            message,
            ..
        } = passes;

        let total_stat = objective.stat(&best);
        let models = objective.models_at(&best);

        let covariance = if self.options.compute_covariance && converged {
            let cov = estimate_covariance(&objective, &best);
            if cov.is_none() {
                warn!("Covariance estimation failed (singular Hessian); parameter errors are unavailable.");
            }
            cov
        } else {
            None
        };

        // Write back into the shared models.
        for (handle, mut model) in handles.iter().zip(models) {
            model.covariance = None;
            for p in model.parameters.iter_mut().filter(|p| p.is_free()) {
                p.error = 0.0;
            }
            handle.borrow_mut().spectral = model;
        }
        if let Some(cov) = &covariance {
            apply_covariance(&handles, &objective, cov);
        }

        let parameters = snapshot_parameters(&handles);
        if converged {
            info!("Fit converged: total stat = {total_stat:.3}");
        } else {
            warn!("Fit did not converge: {message}");
        }

        Ok(FitResult {
            success: converged,
            message,
            n_iterations,
            total_stat,
            parameters,
            covariance,
        })
    }

    fn minimise(&self, objective: &JointObjective<'_>, start: &[f64]) -> Result<PassOutcome, AppError> {
        let solver = NelderMead::new(initial_simplex(start))
            .with_sd_tolerance(self.options.tolerance)
            .map_err(|e| AppError::new(2, format!("Invalid optimiser settings: {e}")))?;

        let max_iters = self.options.max_iters;
        let res = Executor::new(objective.clone(), solver)
            .configure(|state| state.max_iters(max_iters))
            .run()
            .map_err(|e| AppError::new(4, format!("Optimiser error: {e}")))?;

        let state = res.state();
        let factors = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| AppError::new(4, "Optimiser returned no parameters."))?;
        let (converged, message) = match state.get_termination_status() {
            TerminationStatus::Terminated(TerminationReason::SolverConverged) => {
                (true, "Optimization terminated successfully.".to_string())
            }
            TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
                (false, format!("Maximum number of iterations ({max_iters}) reached."))
            }
            other => (false, format!("Optimization stopped: {other:?}")),
        };

        Ok(PassOutcome {
            stat: state.get_best_cost(),
            factors,
            iterations: state.get_iter(),
            converged,
            message,
        })
    }
}

struct PassOutcome {
    factors: Vec<f64>,
    stat: f64,
    iterations: u64,
    converged: bool,
    message: String,
}

/// Best point and status over the optimisation passes.
///
/// A restart only replaces the status of the fit when it lowers the
/// statistic; one that stalls around an already converged point leaves it
/// converged.
struct Passes {
    factors: Vec<f64>,
    stat: f64,
    iterations: u64,
    converged: bool,
    message: String,
}

impl Passes {
    fn new(start: Vec<f64>, stat: f64) -> Self {
        Self {
            factors: start,
            stat,
            iterations: 0,
            converged: false,
            message: String::new(),
        }
    }

    fn record(&mut self, outcome: PassOutcome, first: bool) {
        self.iterations += outcome.iterations;
        let improved = outcome.stat < self.stat;
        if improved {
            self.factors = outcome.factors;
            self.stat = outcome.stat;
        }
        if first || improved {
            self.converged = outcome.converged;
            self.message = outcome.message;
        }
    }
}

/// Start simplex: `x0` plus one vertex per axis, offset by 5% (or 0.00025 at zero).
fn initial_simplex(x0: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.to_vec());
    for i in 0..x0.len() {
        let mut vertex = x0.to_vec();
        vertex[i] = if x0[i] != 0.0 { x0[i] * 1.05 } else { 0.00025 };
        simplex.push(vertex);
    }
    simplex
}

/// Factor-space step of the Hessian differences.
const HESSIAN_STEP: f64 = 1e-3;

/// Hessian of the statistic in factor space.
pub fn stat_hessian(objective: &JointObjective<'_>, x: &[f64]) -> Vec<Vec<f64>> {
    let steps = vec![HESSIAN_STEP; x.len()];
    diff::hessian(&|f: &[f64]| objective.stat(f), x, &steps)
}

/// Covariance of the free parameters in value space.
fn estimate_covariance(objective: &JointObjective<'_>, best: &[f64]) -> Option<Vec<Vec<f64>>> {
    let hessian = stat_hessian(objective, best);
    let cov = covariance_from_hessian(&hessian)?;
    let scales = objective.scales();
    let n = scales.len();
    let out: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| cov[(i, j)] * scales[i] * scales[j]).collect())
        .collect();
    if out.iter().enumerate().any(|(i, row)| !(row[i].is_finite() && row[i] >= 0.0)) {
        return None;
    }
    Some(out)
}

fn apply_covariance(handles: &[ModelHandle], objective: &JointObjective<'_>, cov: &[Vec<f64>]) {
    let free = objective.free();
    for (m, handle) in handles.iter().enumerate() {
        let rows: Vec<usize> = free
            .iter()
            .enumerate()
            .filter(|(_, f)| f.model == m)
            .map(|(k, _)| k)
            .collect();

        let mut model = handle.borrow_mut();
        for &k in &rows {
            model.spectral.parameters[free[k].parameter].error = cov[k][k].sqrt();
        }
        model.spectral.covariance = Some(ModelCovariance {
            indices: rows.iter().map(|&k| free[k].parameter).collect(),
            matrix: rows
                .iter()
                .map(|&a| rows.iter().map(|&b| cov[a][b]).collect())
                .collect(),
        });
    }
}

fn snapshot_parameters(handles: &[ModelHandle]) -> Vec<ParameterSnapshot> {
    let mut out = Vec::new();
    for handle in handles {
        let model = handle.borrow();
        for p in &model.spectral.parameters {
            out.push(ParameterSnapshot {
                model: model.name.clone(),
                name: p.name.clone(),
                value: p.value,
                error: p.error,
                unit: p.unit.clone(),
                frozen: p.frozen,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::SpectrumDataset;
    use crate::domain::EnergyEdges;
    use crate::models::{SkyModel, SpectralModel};

    /// Asimov dataset: counts equal the prediction of the true model.
    fn asimov(name: &str, truth: &SpectralModel) -> SpectrumDataset {
        let edges = EnergyEdges::log_spaced(0.5, 20.0, 12).unwrap();
        let exposure = vec![5e12; 12];
        let background = vec![2.0; 12];
        let template = SpectrumDataset::new(name, "SIM", edges.clone(), vec![0.0; 12], exposure.clone(), background.clone()).unwrap();
        let counts = template.npred_with(truth);
        SpectrumDataset::new(name, "SIM", edges, counts, exposure, background).unwrap()
    }

    #[test]
    fn recovers_power_law_from_asimov_data() {
        let truth = SpectralModel::power_law(2.4, 3e-11, 1.0);
        let mut datasets = Datasets::new(vec![asimov("a", &truth), asimov("b", &truth)]);
        let handle = ModelHandle::new(SkyModel::new("CrabNebula", SpectralModel::power_law(2.0, 1e-11, 1.0)));
        datasets.set_models(&handle);

        let result = Fit::default().run(&datasets).unwrap();
        assert!(result.success, "{}", result.message);

        let model = handle.borrow();
        let index = model.spectral.parameter("index").unwrap();
        let amplitude = model.spectral.parameter("amplitude").unwrap();
        assert!((index.value - 2.4).abs() < 1e-3, "index={}", index.value);
        assert!(((amplitude.value - 3e-11) / 3e-11).abs() < 1e-3);
        assert!(index.error > 0.0 && index.error < 0.5);
        assert!(model.spectral.covariance.is_some());
    }

    #[test]
    fn empty_collection_is_an_error() {
        let datasets = Datasets::default();
        let err = Fit::default().run(&datasets).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn unbound_dataset_is_an_error() {
        let truth = SpectralModel::power_law(2.4, 3e-11, 1.0);
        let datasets = Datasets::new(vec![asimov("a", &truth)]);
        assert!(Fit::default().run(&datasets).is_err());
    }

    #[test]
    fn all_frozen_is_an_error() {
        let truth = SpectralModel::power_law(2.4, 3e-11, 1.0);
        let mut datasets = Datasets::new(vec![asimov("a", &truth)]);
        let mut frozen = truth.clone();
        frozen.freeze_all();
        datasets.set_models(&ModelHandle::new(SkyModel::new("CrabNebula", frozen)));
        assert!(Fit::default().run(&datasets).is_err());
    }

    #[test]
    fn repeated_fit_is_deterministic() {
        let truth = SpectralModel::log_parabola(3e-11, 1.0, 2.5, 0.1);
        let datasets_for = |start: &SpectralModel| {
            let mut d = Datasets::new(vec![asimov("a", &truth)]);
            let h = ModelHandle::new(SkyModel::new("CrabNebula", start.clone()));
            d.set_models(&h);
            (d, h)
        };
        let start = SpectralModel::log_parabola(1e-11, 1.0, 2.0, 0.0);
        let (d1, h1) = datasets_for(&start);
        let (d2, h2) = datasets_for(&start);

        let r1 = Fit::default().run(&d1).unwrap();
        let r2 = Fit::default().run(&d2).unwrap();
        assert_eq!(r1.total_stat, r2.total_stat);
        assert_eq!(h1.borrow().spectral.values(), h2.borrow().spectral.values());
    }

    #[test]
    fn simplex_has_one_vertex_per_axis() {
        let s = initial_simplex(&[1.0, 0.0]);
        assert_eq!(s.len(), 3);
        assert_eq!(s[1], vec![1.05, 0.0]);
        assert_eq!(s[2], vec![1.0, 0.00025]);
    }

    #[test]
    fn failed_result_converts_to_error() {
        let r = FitResult {
            success: false,
            message: "Maximum number of iterations (1) reached.".to_string(),
            n_iterations: 1,
            total_stat: 0.0,
            parameters: Vec::new(),
            covariance: None,
        };
        assert_eq!(r.ensure_success().unwrap_err().exit_code(), 4);
    }

    #[test]
    fn iteration_limit_reports_failure() {
        let truth = SpectralModel::log_parabola(3e-11, 1.0, 2.5, 0.1);
        let mut datasets = Datasets::new(vec![asimov("a", &truth)]);
        datasets.set_models(&ModelHandle::new(SkyModel::new(
            "CrabNebula",
            SpectralModel::log_parabola(1e-11, 1.0, 2.0, 0.0),
        )));

        let options = FitOptions {
            max_iters: 1,
            ..FitOptions::default()
        };
        let result = Fit::new(options).run(&datasets).unwrap();
        assert!(!result.success);
        assert!(result.message.contains("Maximum number of iterations"), "{}", result.message);
        assert!(result.covariance.is_none());
        assert_eq!(result.ensure_success().unwrap_err().exit_code(), 4);
    }

    #[test]
    fn non_finite_start_is_a_numerical_error() {
        let truth = SpectralModel::power_law(2.4, 3e-11, 1.0);
        let mut datasets = Datasets::new(vec![asimov("a", &truth)]);
        datasets.set_models(&ModelHandle::new(SkyModel::new(
            "CrabNebula",
            SpectralModel::power_law(2.4, f64::NAN, 1.0),
        )));

        let err = Fit::default().run(&datasets).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("not finite"), "{err}");
    }

    fn outcome(stat: f64, converged: bool) -> PassOutcome {
        PassOutcome {
            factors: vec![stat],
            stat,
            iterations: 10,
            converged,
            message: if converged { "converged" } else { "limit" }.to_string(),
        }
    }

    #[test]
    fn stalled_restart_keeps_converged_status() {
        let mut passes = Passes::new(vec![0.0], 100.0);
        passes.record(outcome(5.0, true), true);
        passes.record(outcome(5.0, false), false);
        assert!(passes.converged);
        assert_eq!(passes.message, "converged");
        assert_eq!(passes.factors, vec![5.0]);
        assert_eq!(passes.iterations, 20);

        passes.record(outcome(4.0, false), false);
        assert!(!passes.converged);
        assert_eq!(passes.factors, vec![4.0]);
    }

    #[test]
    fn first_pass_status_is_always_taken() {
        let mut passes = Passes::new(vec![1.0], 5.0);
        passes.record(outcome(5.0, false), true);
        assert!(!passes.converged);
        assert_eq!(passes.factors, vec![1.0]);
    }

    #[test]
    fn summary_counts_iterations() {
        let r = FitResult {
            success: true,
            message: "Optimization terminated successfully.".to_string(),
            n_iterations: 42,
            total_stat: 12.5,
            parameters: Vec::new(),
            covariance: None,
        };
        let text = r.to_string();
        assert!(text.contains("iterations : 42"), "{text}");
        assert!(!text.contains("nfev"));
    }
}
