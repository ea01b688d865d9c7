//! Synthetic spectrum datasets for the three telescopes.
//!
//! Each observation gets an energy-dependent exposure (effective area rising
//! above the instrument threshold), a power-law background, and Poisson counts
//! drawn around the predicted counts of a source model. The random stream is
//! seeded from the user seed, the instrument and the observation index, so a
//! run is reproducible.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;
use serde::{Deserialize, Serialize};

use crate::datasets::SpectrumDataset;
use crate::domain::{colors, EnergyEdges, MarkerKind, SeriesStyle};
use crate::error::AppError;
use crate::models::SpectralModel;

/// Observing characteristics of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Short name used in dataset names and file names.
    pub name: String,
    /// Display label (legend, reports).
    pub label: String,
    pub e_min: f64,
    pub e_max: f64,
    pub n_bins: usize,
    pub n_obs: usize,
    /// Plateau exposure per observation (cm² s).
    pub exposure: f64,
    /// Energy (TeV) at which the exposure reaches half its plateau.
    pub threshold: f64,
    /// Expected background counts per bin at 1 TeV.
    pub background: f64,
    pub background_index: f64,
    pub style: SeriesStyle,
}

impl InstrumentProfile {
    pub fn hess() -> Self {
        Self {
            name: "hess".to_string(),
            label: "H.E.S.S.".to_string(),
            e_min: 0.7,
            e_max: 40.0,
            n_bins: 16,
            n_obs: 2,
            exposure: 6.0e12,
            threshold: 0.8,
            background: 4.0,
            background_index: 1.8,
            style: SeriesStyle::new(colors::TEAL, MarkerKind::Square),
        }
    }

    pub fn magic() -> Self {
        Self {
            name: "magic".to_string(),
            label: "MAGIC".to_string(),
            e_min: 0.08,
            e_max: 20.0,
            n_bins: 18,
            n_obs: 2,
            exposure: 3.0e12,
            threshold: 0.1,
            background: 6.0,
            background_index: 2.0,
            style: SeriesStyle::new(colors::DIMGRAY, MarkerKind::Circle),
        }
    }

    pub fn lst() -> Self {
        Self {
            name: "lst".to_string(),
            label: "LST".to_string(),
            e_min: 0.03,
            e_max: 20.0,
            n_bins: 20,
            n_obs: 4,
            exposure: 1.5e12,
            threshold: 0.04,
            background: 8.0,
            background_index: 2.2,
            style: SeriesStyle::new(colors::DARKORANGE, MarkerKind::Triangle),
        }
    }

    /// The H.E.S.S., MAGIC and LST presets, in that order.
    pub fn presets() -> Vec<Self> {
        vec![Self::hess(), Self::magic(), Self::lst()]
    }

    pub fn edges(&self) -> Result<EnergyEdges, AppError> {
        EnergyEdges::log_spaced(self.e_min, self.e_max, self.n_bins)
    }

    /// Exposure at `energy`: `plateau / (1 + (threshold / E)^3)`.
    pub fn exposure_at(&self, energy: f64) -> f64 {
        self.exposure / (1.0 + (self.threshold / energy).powi(3))
    }

    pub fn background_at(&self, energy: f64) -> f64 {
        self.background * energy.powf(-self.background_index)
    }
}

/// Simulate `profile.n_obs` observations of a source with spectrum `model`.
pub fn simulate_instrument(
    profile: &InstrumentProfile,
    model: &SpectralModel,
    seed: u64,
) -> Result<Vec<SpectrumDataset>, AppError> {
    if profile.n_obs == 0 {
        return Err(AppError::new(2, format!("Instrument '{}' needs at least one observation.", profile.name)));
    }
    if !(profile.exposure.is_finite() && profile.exposure > 0.0 && profile.background >= 0.0) {
        return Err(AppError::new(2, format!("Invalid exposure/background for '{}'.", profile.name)));
    }
    let edges = profile.edges()?;
    let centers = edges.centers();
    let exposure: Vec<f64> = centers.iter().map(|&e| profile.exposure_at(e)).collect();
    let background: Vec<f64> = centers.iter().map(|&e| profile.background_at(e)).collect();

    let mut out = Vec::with_capacity(profile.n_obs);
    for obs in 0..profile.n_obs {
        let name = format!("{}-obs{:02}", profile.name, obs + 1);
        let template = SpectrumDataset::new(
            name.clone(),
            profile.label.clone(),
            edges.clone(),
            vec![0.0; edges.n_bins()],
            exposure.clone(),
            background.clone(),
        )?;

        let mut rng = StdRng::seed_from_u64(observation_seed(seed, &profile.name, obs));
        let counts = template
            .npred_with(model)
            .into_iter()
            .map(|mu| draw_poisson(&mut rng, mu))
            .collect::<Result<Vec<f64>, AppError>>()?;
        debug!("simulated {name}: {} counts", counts.iter().sum::<f64>());

        out.push(SpectrumDataset::new(
            name,
            profile.label.clone(),
            edges.clone(),
            counts,
            exposure.clone(),
            background.clone(),
        )?);
    }
    Ok(out)
}

fn draw_poisson(rng: &mut StdRng, mu: f64) -> Result<f64, AppError> {
    if mu <= 0.0 {
        return Ok(0.0);
    }
    let dist = Poisson::new(mu).map_err(|e| AppError::new(4, format!("Poisson distribution error: {e}")))?;
    Ok(dist.sample(rng))
}

fn observation_seed(seed: u64, instrument: &str, obs: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    instrument.hash(&mut hasher);
    obs.hash(&mut hasher);
    hasher.finish()
}
