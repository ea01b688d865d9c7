//! Per-bin flux point estimation.
//!
//! For every bin of the requested energy edges the best-fit spectral shape is
//! held fixed and only a multiplicative `norm` is fitted to the dataset bins
//! whose centre falls inside the flux-point bin:
//!
//! `μ_i(norm) = b_i + norm · s_i`, with `s_i = ε_i ∫ dN/dE` of the reference model.
//!
//! The Cash statistic is convex in `norm`, so the best fit is found with a
//! bracketed Brent minimisation and the asymmetric errors / upper limits with
//! Brent root finding on `stat(norm) − (stat_min + Δ)`.

use std::fmt;
use std::str::FromStr;

use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::brent::{BrentOpt, BrentRoot};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::datasets::Datasets;
use crate::domain::{EnergyEdges, SedType};
use crate::error::AppError;
use crate::math::{cash, ts_to_sqrt_ts};
use crate::models::{integral_with_values, ModelHandle, SpectralModel};

const BRENT_MAX_ITERS: u64 = 200;
const BRENT_TOLERANCE: f64 = 1e-8;
const MAX_BRACKET_DOUBLINGS: usize = 60;

/// Optional quantities computed on top of `norm`, `norm_err` and `ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptional {
    pub errn_errp: bool,
    pub ul: bool,
    pub scan: bool,
}

impl SelectionOptional {
    pub const fn all() -> Self {
        Self {
            errn_errp: true,
            ul: true,
            scan: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            errn_errp: false,
            ul: false,
            scan: false,
        }
    }
}

impl Default for SelectionOptional {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for SelectionOptional {
    type Err = AppError;

    /// Comma-separated list of `errn-errp`, `ul`, `scan`, or `all` / `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = Self::none();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "all" => out = Self::all(),
                "none" => {}
                "errn-errp" | "errn_errp" => out.errn_errp = true,
                "ul" => out.ul = true,
                "scan" => out.scan = true,
                other => {
                    return Err(AppError::new(
                        2,
                        format!("Unknown optional flux point quantity '{other}'."),
                    ));
                }
            }
        }
        Ok(out)
    }
}

/// Likelihood profile of one flux-point bin over `norm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormScan {
    pub norm: Vec<f64>,
    pub stat: Vec<f64>,
}

/// One flux point: the fitted norm of the reference spectrum in `[e_min, e_max)`.
///
/// Quantities that were not requested (or could not be computed) are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxPoint {
    pub e_min: f64,
    pub e_max: f64,
    pub e_ref: f64,
    /// Reference model `dN/dE` at `e_ref`.
    pub ref_dnde: f64,
    pub norm: f64,
    pub norm_err: f64,
    pub norm_errn: f64,
    pub norm_errp: f64,
    pub norm_ul: f64,
    pub ts: f64,
    pub sqrt_ts: f64,
    pub stat: f64,
    pub stat_null: f64,
    pub counts: f64,
    pub npred_background: f64,
    /// Number of dataset bins that entered the fit.
    pub n_bins: usize,
    pub is_ul: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_scan: Option<NormScan>,
}

/// Flux value and errors in one SED representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SedValue {
    pub value: f64,
    pub errn: f64,
    pub errp: f64,
    pub ul: f64,
}

impl FluxPoint {
    fn empty(e_min: f64, e_max: f64, ref_dnde: f64) -> Self {
        Self {
            e_min,
            e_max,
            e_ref: (e_min * e_max).sqrt(),
            ref_dnde,
            norm: f64::NAN,
            norm_err: f64::NAN,
            norm_errn: f64::NAN,
            norm_errp: f64::NAN,
            norm_ul: f64::NAN,
            ts: f64::NAN,
            sqrt_ts: f64::NAN,
            stat: f64::NAN,
            stat_null: f64::NAN,
            counts: 0.0,
            npred_background: 0.0,
            n_bins: 0,
            is_ul: false,
            success: false,
            stat_scan: None,
        }
    }

    pub fn dnde(&self) -> f64 {
        self.norm * self.ref_dnde
    }

    pub fn dnde_err(&self) -> f64 {
        self.norm_err * self.ref_dnde
    }

    /// Value and errors converted to `sed_type`.
    ///
    /// Asymmetric errors fall back to the symmetric `norm_err` when absent.
    pub fn sed(&self, sed_type: SedType) -> SedValue {
        let convert = |norm: f64| sed_type.from_dnde(self.e_ref, norm * self.ref_dnde);
        let errn = if self.norm_errn.is_finite() { self.norm_errn } else { self.norm_err };
        let errp = if self.norm_errp.is_finite() { self.norm_errp } else { self.norm_err };
        SedValue {
            value: convert(self.norm),
            errn: convert(errn),
            errp: convert(errp),
            ul: convert(self.norm_ul),
        }
    }
}

/// Ordered flux points for one source, one per energy bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxPoints {
    pub source: String,
    pub reference: SpectralModel,
    pub points: Vec<FluxPoint>,
}

impl FluxPoints {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FluxPoint> {
        self.points.iter()
    }

    /// `(e_min, e_max)` of every point, in bin order.
    pub fn energy_bins(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p.e_min, p.e_max)).collect()
    }

    pub fn n_successful(&self) -> usize {
        self.points.iter().filter(|p| p.success).count()
    }
}

impl fmt::Display for FluxPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FluxPoints")?;
        writeln!(f, "----------")?;
        writeln!(f)?;
        writeln!(f, "  source     : {}", self.source)?;
        writeln!(f, "  n_points   : {}", self.len())?;
        writeln!(f, "  successful : {}", self.n_successful())?;
        writeln!(f, "  upper lims : {}", self.points.iter().filter(|p| p.is_ul).count())
    }
}

/// Estimates flux points for `source` on the datasets it is called with.
#[derive(Debug, Clone)]
pub struct FluxPointsEstimator {
    pub energy_edges: EnergyEdges,
    pub source: String,
    pub selection_optional: SelectionOptional,
    pub n_sigma: f64,
    pub n_sigma_ul: f64,
    pub ts_threshold_ul: f64,
    pub norm_min: f64,
    pub norm_max: f64,
    pub norm_n_values: usize,
}

impl FluxPointsEstimator {
    pub fn new(energy_edges: EnergyEdges, source: impl Into<String>) -> Self {
        Self {
            energy_edges,
            source: source.into(),
            selection_optional: SelectionOptional::all(),
            n_sigma: 1.0,
            n_sigma_ul: 2.0,
            ts_threshold_ul: 4.0,
            norm_min: 0.2,
            norm_max: 5.0,
            norm_n_values: 11,
        }
    }

    pub fn with_selection_optional(mut self, selection: SelectionOptional) -> Self {
        self.selection_optional = selection;
        self
    }

    /// Estimate one flux point per bin of `energy_edges`.
    ///
    /// Every member must hold the same model handle; it is the reference
    /// model of the points. The model is read once into value snapshots and
    /// the handle is never modified.
    pub fn run(&self, datasets: &Datasets) -> Result<FluxPoints, AppError> {
        if datasets.is_empty() {
            return Err(AppError::new(3, "No datasets given to the flux point estimator."));
        }
        if !(self.norm_min > 0.0 && self.norm_max > self.norm_min) {
            return Err(AppError::new(2, "Flux point norm range must satisfy 0 < norm_min < norm_max."));
        }

        let mut snapshots: Vec<SpectralModel> = Vec::with_capacity(datasets.len());
        let mut shared: Option<&ModelHandle> = None;
        for ds in datasets {
            let handle = ds
                .models()
                .ok_or_else(|| AppError::new(2, format!("Dataset '{}' has no model assigned.", ds.name)))?;
            let first = *shared.get_or_insert(handle);
            if !ModelHandle::ptr_eq(first, handle) {
                return Err(AppError::new(
                    2,
                    format!("Dataset '{}' is bound to a different model than the other members.", ds.name),
                ));
            }
            let model = handle.borrow();
            if model.name != self.source {
                return Err(AppError::new(
                    2,
                    format!(
                        "Dataset '{}' is bound to '{}', expected source '{}'.",
                        ds.name, model.name, self.source
                    ),
                ));
            }
            snapshots.push(model.spectral.clone());
        }
        let reference = snapshots[0].clone();

        let bins: Vec<BinData> = self
            .energy_edges
            .bins()
            .map(|(lo, hi)| BinData::collect(datasets, &snapshots, lo, hi))
            .collect();

        let points: Vec<FluxPoint> = bins
            .par_iter()
            .map(|bin| self.estimate_bin(bin, &reference))
            .collect();

        for p in points.iter().filter(|p| !p.success) {
            warn!(
                "Flux point {:.3}-{:.3} TeV for '{}' could not be estimated.",
                p.e_min, p.e_max, self.source
            );
        }

        Ok(FluxPoints {
            source: self.source.clone(),
            reference,
            points,
        })
    }

    fn estimate_bin(&self, bin: &BinData, reference: &SpectralModel) -> FluxPoint {
        let e_ref = (bin.e_min * bin.e_max).sqrt();
        let mut point = FluxPoint::empty(bin.e_min, bin.e_max, reference.evaluate(e_ref));
        point.counts = bin.counts.iter().sum();
        point.npred_background = bin.background.iter().sum();
        point.n_bins = bin.counts.len();

        if bin.counts.is_empty() || bin.signal.iter().sum::<f64>() <= 0.0 {
            return point;
        }

        let upper = bin.norm_upper_bound(self.norm_max);
        let norm = match minimize_norm(bin, upper) {
            Ok(norm) => norm,
            Err(e) => {
                debug!("norm fit failed in {:.3}-{:.3} TeV: {e}", bin.e_min, bin.e_max);
                return point;
            }
        };

        let stat = bin.stat(norm);
        let stat_null = bin.stat(0.0);
        point.norm = norm;
        point.stat = stat;
        point.stat_null = stat_null;
        point.ts = (stat_null - stat).max(0.0);
        point.sqrt_ts = ts_to_sqrt_ts(if norm > 0.0 { point.ts } else { -point.ts });
        point.norm_err = bin.norm_err(norm);

        if self.selection_optional.errn_errp {
            let delta = self.n_sigma * self.n_sigma;
            point.norm_errn = norm - crossing_below(bin, norm, stat + delta).unwrap_or(0.0);
            point.norm_errp = crossing_above(bin, norm, stat + delta).map_or(f64::NAN, |x| x - norm);
        }
        if self.selection_optional.ul {
            let delta = self.n_sigma_ul * self.n_sigma_ul;
            point.norm_ul = crossing_above(bin, norm, stat + delta).unwrap_or(f64::NAN);
            point.is_ul = point.ts < self.ts_threshold_ul;
        }
        if self.selection_optional.scan {
            let grid = log_grid(self.norm_min, self.norm_max, self.norm_n_values);
            let stat_scan = grid.iter().map(|&x| bin.stat(x)).collect();
            point.stat_scan = Some(NormScan { norm: grid, stat: stat_scan });
        }

        point.success = point.norm.is_finite() && (point.norm_err.is_finite() || point.norm_ul.is_finite());
        debug!(
            "flux point {:.3}-{:.3} TeV: norm={:.4} ± {:.4}, ts={:.2}, n_bins={}",
            bin.e_min, bin.e_max, point.norm, point.norm_err, point.ts, point.n_bins
        );
        point
    }
}

/// Plain-data view of every dataset bin inside one flux-point bin.
#[derive(Debug, Clone)]
struct BinData {
    e_min: f64,
    e_max: f64,
    counts: Vec<f64>,
    background: Vec<f64>,
    signal: Vec<f64>,
}

impl BinData {
    fn collect(datasets: &Datasets, models: &[SpectralModel], lo: f64, hi: f64) -> Self {
        let mut bin = BinData {
            e_min: lo,
            e_max: hi,
            counts: Vec::new(),
            background: Vec::new(),
            signal: Vec::new(),
        };
        for (ds, model) in datasets.iter().zip(models) {
            let values = model.values();
            for i in ds.bins_in(lo, hi) {
                let (e1, e2) = (ds.edges().as_slice()[i], ds.edges().as_slice()[i + 1]);
                bin.counts.push(ds.counts()[i]);
                bin.background.push(ds.background()[i]);
                bin.signal.push(ds.exposure()[i] * integral_with_values(model.kind, e1, e2, &values));
            }
        }
        bin
    }

    fn stat(&self, norm: f64) -> f64 {
        self.counts
            .iter()
            .zip(&self.background)
            .zip(&self.signal)
            .map(|((&n, &b), &s)| cash(n, b + norm * s))
            .sum()
    }

    /// Second derivative of the statistic with respect to `norm`.
    fn curvature(&self, norm: f64) -> f64 {
        self.counts
            .iter()
            .zip(&self.background)
            .zip(&self.signal)
            .map(|((&n, &b), &s)| {
                let mu = b + norm * s;
                if mu > 0.0 { 2.0 * n * s * s / (mu * mu) } else { 0.0 }
            })
            .sum()
    }

    fn norm_err(&self, norm: f64) -> f64 {
        let h = self.curvature(norm);
        if h > 0.0 { (2.0 / h).sqrt() } else { f64::NAN }
    }

    /// Above `max(n_i / s_i)` every term of the statistic increases with
    /// `norm`, so the minimum lies below it.
    fn norm_upper_bound(&self, norm_max: f64) -> f64 {
        let ratio = self
            .counts
            .iter()
            .zip(&self.signal)
            .filter(|(_, s)| **s > 0.0)
            .map(|(n, s)| n / s)
            .fold(0.0_f64, f64::max);
        (1.1 * ratio + 1.0).max(norm_max)
    }
}

struct NormProfile<'a> {
    bin: &'a BinData,
}

impl CostFunction for NormProfile<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, norm: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.bin.stat(*norm))
    }
}

struct NormCrossing<'a> {
    bin: &'a BinData,
    target: f64,
}

impl CostFunction for NormCrossing<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, norm: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.bin.stat(*norm) - self.target)
    }
}

fn minimize_norm(bin: &BinData, upper: f64) -> Result<f64, AppError> {
    let solver = BrentOpt::new(0.0, upper);
    let res = Executor::new(NormProfile { bin }, solver)
        .configure(|state| state.max_iters(BRENT_MAX_ITERS))
        .run()
        .map_err(|e| AppError::new(4, format!("Norm fit failed: {e}")))?;
    res.state()
        .get_best_param()
        .copied()
        .filter(|x| x.is_finite())
        .ok_or_else(|| AppError::new(4, "Norm fit returned no parameter."))
}

fn find_root(bin: &BinData, target: f64, a: f64, b: f64) -> Option<f64> {
    let solver = BrentRoot::new(a, b, BRENT_TOLERANCE);
    let res = Executor::new(NormCrossing { bin, target }, solver)
        .configure(|state| state.max_iters(BRENT_MAX_ITERS))
        .run()
        .ok()?;
    res.state().get_best_param().copied().filter(|x| x.is_finite())
}

/// Norm below `best` where the statistic reaches `target`; `None` when the
/// profile stays below `target` down to zero.
fn crossing_below(bin: &BinData, best: f64, target: f64) -> Option<f64> {
    if best <= 0.0 || bin.stat(0.0) < target {
        return None;
    }
    find_root(bin, target, 0.0, best)
}

/// Norm above `best` where the statistic reaches `target`.
fn crossing_above(bin: &BinData, best: f64, target: f64) -> Option<f64> {
    let mut step = bin.norm_err(best);
    if !(step.is_finite() && step > 0.0) {
        step = best.abs().max(1.0);
    }
    let mut hi = best + step;
    for _ in 0..MAX_BRACKET_DOUBLINGS {
        if bin.stat(hi) >= target {
            return find_root(bin, target, best, hi);
        }
        step *= 2.0;
        hi = best + step;
    }
    None
}

fn log_grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let (a, b) = (lo.ln(), hi.ln());
    (0..n)
        .map(|i| (a + (b - a) * i as f64 / (n as f64 - 1.0)).exp())
        .collect()
}
