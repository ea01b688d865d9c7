//! Shared analysis pipeline used by both the CLI and the TUI front-ends.
//!
//! aggregate -> bind model -> joint fit -> flux points per instrument
//!
//! Stages run strictly in order; the first failing stage ends the run.

use log::{debug, info};

use crate::data::{simulate_instrument, InstrumentProfile};
use crate::datasets::{Datasets, SpectrumDataset};
use crate::domain::{colors, EnergyEdges, EnergyRange, FluxPointModel, SedType, SeriesStyle};
use crate::error::AppError;
use crate::estimators::{FluxPoints, FluxPointsEstimator};
use crate::fit::{Fit, FitResult};
use crate::io::{AnalysisConfig, InstrumentConfig};
use crate::models::{crab_magic_lp, default_references, ModelHandle, SkyModel, SpectralModel};
use crate::plot::SedChart;

/// Flux points (and, per-instrument mode, the re-fit) of one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentResult {
    pub name: String,
    pub label: String,
    pub style: SeriesStyle,
    pub flux_points: FluxPoints,
    pub refit: Option<FitResult>,
}

/// All computed outputs of one analysis run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The joint collection, every member bound to `model`.
    pub datasets: Datasets,
    pub model: ModelHandle,
    pub fit: FitResult,
    pub instruments: Vec<InstrumentResult>,
    pub plot_range: EnergyRange,
}

/// What to include when turning a run into an SED chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub sed_type: SedType,
    pub references: bool,
    pub model: bool,
    /// 1σ band around the model (needs `model` and a fit covariance).
    pub band: bool,
    /// Visibility per instrument, in run order (missing entries are visible).
    pub instruments: Vec<bool>,
}

impl ChartOptions {
    pub fn new(sed_type: SedType) -> Self {
        Self {
            sed_type,
            references: true,
            model: true,
            band: true,
            instruments: Vec::new(),
        }
    }

    pub fn instrument_visible(&self, idx: usize) -> bool {
        self.instruments.get(idx).copied().unwrap_or(true)
    }
}

impl RunOutput {
    /// References, joint model with its error band, then each instrument's points.
    pub fn sed_chart(&self, options: &ChartOptions) -> SedChart {
        let model = self.model.snapshot();
        let mut chart = SedChart::new(options.sed_type, self.plot_range).with_title(model.name.clone());
        if options.references {
            chart = chart.with_references(&default_references(self.plot_range));
        }
        if options.model {
            chart = chart.with_model("Joint fit", &model.spectral, colors::GRAY);
            if !options.band {
                chart.band = None;
            }
        }
        for (idx, inst) in self.instruments.iter().enumerate() {
            if options.instrument_visible(idx) {
                chart = chart.with_flux_points(inst.label.clone(), inst.style, &inst.flux_points);
            }
        }
        chart
    }
}

/// Execute the full pipeline on per-instrument dataset sequences.
///
/// `inputs[i]` holds the datasets of `config.instruments[i]`.
pub fn run_analysis(config: &AnalysisConfig, inputs: Vec<Vec<SpectrumDataset>>) -> Result<RunOutput, AppError> {
    config.validate()?;
    if inputs.len() != config.instruments.len() {
        return Err(AppError::new(
            2,
            format!(
                "Got {} dataset group(s) for {} configured instrument(s).",
                inputs.len(),
                config.instruments.len()
            ),
        ));
    }
    let sizes: Vec<usize> = inputs.iter().map(Vec::len).collect();

    // 1) Aggregate.
    let mut datasets = Datasets::concat(inputs);
    info!(
        "Aggregated {} dataset(s) from {} instrument group(s): {}",
        datasets.len(),
        sizes.len(),
        datasets.instruments().join(", ")
    );

    // 2) Bind one shared model to every member.
    let model = ModelHandle::new(SkyModel::new(config.source.clone(), config.model.clone()));
    datasets.set_models(&model);
    debug!("'{}' is shared by {} holder(s)", config.source, model.holders());

    // 3) Joint fit.
    let fit = Fit::new(config.fit.clone()).run(&datasets)?;
    fit.ensure_success()?;
    info!("Joint fit converged: total stat {:.2}", fit.total_stat);

    // 4) Flux points per instrument.
    let mut instruments = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for (inst, &n) in config.instruments.iter().zip(&sizes) {
        let subset = Datasets::new(datasets.iter().skip(start).take(n).cloned().collect());
        start += n;
        instruments.push(estimate_instrument(config, inst, subset, &model)?);
    }

    let plot_range = match config.plot_range {
        Some(range) => range,
        None => widest_range(&datasets)?,
    };

    Ok(RunOutput {
        datasets,
        model,
        fit,
        instruments,
        plot_range,
    })
}

fn estimate_instrument(
    config: &AnalysisConfig,
    inst: &InstrumentConfig,
    mut subset: Datasets,
    joint_model: &ModelHandle,
) -> Result<InstrumentResult, AppError> {
    let first = subset
        .get(0)
        .ok_or_else(|| AppError::new(3, format!("Instrument '{}' has no datasets.", inst.name)))?;
    let edges: EnergyEdges = match &inst.energy_edges {
        Some(edges) => edges.clone(),
        None => first.edges().clone(),
    };

    let refit = match config.flux_point_model {
        FluxPointModel::Joint => None,
        FluxPointModel::PerInstrument => {
            let own = joint_model.deep_clone();
            subset.set_models(&own);
            let fit = Fit::new(config.fit.clone())
                .run(&subset)
                .map_err(|e| e.context(format!("re-fit for {}", inst.label)))?;
            fit.ensure_success()
                .map_err(|e| e.context(format!("re-fit for {}", inst.label)))?;
            Some(fit)
        }
    };

    let flux_points = FluxPointsEstimator::new(edges, config.source.clone())
        .with_selection_optional(config.selection_optional)
        .run(&subset)?;
    info!(
        "{}: {} flux point(s), {} successful",
        inst.label,
        flux_points.len(),
        flux_points.n_successful()
    );

    Ok(InstrumentResult {
        name: inst.name.clone(),
        label: inst.label.clone(),
        style: inst.style,
        flux_points,
        refit,
    })
}

fn widest_range(datasets: &Datasets) -> Result<EnergyRange, AppError> {
    let lo = datasets.iter().map(|d| d.edges().e_min()).fold(f64::INFINITY, f64::min);
    let hi = datasets.iter().map(|d| d.edges().e_max()).fold(f64::NEG_INFINITY, f64::max);
    EnergyRange::new(lo, hi)
}

/// Spectrum the simulated source is drawn from (MAGIC 2015 log-parabola).
pub fn simulation_truth() -> Result<SpectralModel, AppError> {
    Ok(crab_magic_lp(EnergyRange::new(0.01, 100.0)?).model)
}

/// Simulate every profile and pair the datasets with a matching configuration.
pub fn simulate_inputs(
    profiles: &[InstrumentProfile],
    seed: u64,
) -> Result<(AnalysisConfig, Vec<Vec<SpectrumDataset>>), AppError> {
    let truth = simulation_truth()?;
    let inputs = profiles
        .iter()
        .map(|p| simulate_instrument(p, &truth, seed))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((AnalysisConfig::from_profiles(profiles), inputs))
}
