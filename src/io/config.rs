//! Analysis configuration files.
//!
//! An `analysis.json` lists the instruments with their dataset files, the
//! source model to fit, fit options and plot settings. Dataset paths are
//! resolved relative to the directory holding the configuration.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::data::InstrumentProfile;
use crate::datasets::SpectrumDataset;
use crate::domain::{EnergyEdges, EnergyRange, FluxPointModel, SedType, SeriesStyle};
use crate::error::AppError;
use crate::estimators::SelectionOptional;
use crate::fit::FitOptions;
use crate::io::dataset::read_dataset_json;
use crate::models::SpectralModel;

pub const DEFAULT_SOURCE: &str = "CrabNebula";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    pub label: String,
    pub datasets: Vec<PathBuf>,
    /// Flux point edges; the first dataset's energy axis when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_edges: Option<EnergyEdges>,
    pub style: SeriesStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_model")]
    pub model: SpectralModel,
    #[serde(default)]
    pub fit: FitOptions,
    pub instruments: Vec<InstrumentConfig>,
    /// Energy range of the model/reference curves; widest instrument range when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_range: Option<EnergyRange>,
    #[serde(default = "default_flux_point_model")]
    pub flux_point_model: FluxPointModel,
    #[serde(default = "default_sed_type")]
    pub sed_type: SedType,
    #[serde(default)]
    pub selection_optional: SelectionOptional,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

/// Starting point of the joint fit: a log-parabola near the Crab flux.
pub fn default_model() -> SpectralModel {
    SpectralModel::log_parabola(1e-11, 1.0, 2.0, 0.1)
}

fn default_flux_point_model() -> FluxPointModel {
    FluxPointModel::Joint
}

fn default_sed_type() -> SedType {
    SedType::E2dnde
}

impl AnalysisConfig {
    /// Configuration for the simulated instrument presets.
    ///
    /// Dataset paths follow `simulate`'s layout: `<name>/<name>-obsNN.json`.
    pub fn from_profiles(profiles: &[InstrumentProfile]) -> Self {
        let instruments = profiles
            .iter()
            .map(|p| InstrumentConfig {
                name: p.name.clone(),
                label: p.label.clone(),
                datasets: (0..p.n_obs)
                    .map(|i| PathBuf::from(&p.name).join(format!("{}-obs{:02}.json", p.name, i + 1)))
                    .collect(),
                energy_edges: None,
                style: p.style,
            })
            .collect();
        Self {
            source: default_source(),
            model: default_model(),
            fit: FitOptions::default(),
            instruments,
            plot_range: None,
            flux_point_model: default_flux_point_model(),
            sed_type: default_sed_type(),
            selection_optional: SelectionOptional::all(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open config '{}': {e}", path.display())))?;
        let config: AnalysisConfig = serde_json::from_reader(file)
            .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path)
            .map_err(|e| AppError::new(2, format!("Failed to create config '{}': {e}", path.display())))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| AppError::new(2, format!("Failed to write config JSON: {e}")))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.source.trim().is_empty() {
            return Err(AppError::new(2, "Config: source name must not be empty."));
        }
        self.model.validate().map_err(|e| e.context("Config: model"))?;
        for inst in &self.instruments {
            if inst.datasets.is_empty() {
                return Err(AppError::new(
                    2,
                    format!("Config: instrument '{}' lists no datasets.", inst.name),
                ));
            }
        }
        let mut names: Vec<&str> = self.instruments.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.instruments.len() {
            return Err(AppError::new(2, "Config: instrument names must be unique."));
        }
        Ok(())
    }

    /// Load every instrument's datasets, in configuration order.
    pub fn load_datasets(&self, base_dir: &Path) -> Result<Vec<Vec<SpectrumDataset>>, AppError> {
        self.instruments
            .iter()
            .map(|inst| {
                let sets = inst
                    .datasets
                    .iter()
                    .map(|p| read_dataset_json(&base_dir.join(p)))
                    .collect::<Result<Vec<_>, _>>()?;
                info!("Loaded {} dataset(s) for {}", sets.len(), inst.label);
                Ok(sets)
            })
            .collect()
    }
}

/// Directory that relative dataset paths in `config_path` refer to.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let json = r#"{
            "instruments": [
                {"name": "magic", "label": "MAGIC", "datasets": ["m1.json"],
                 "style": {"color": [105, 105, 105], "marker": "circle"}}
            ]
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.source, "CrabNebula");
        assert_eq!(config.flux_point_model, FluxPointModel::Joint);
        assert_eq!(config.sed_type, SedType::E2dnde);
        assert_eq!(config.selection_optional, SelectionOptional::all());
        assert_eq!(config.fit.max_iters, FitOptions::default().max_iters);
        config.validate().unwrap();
    }

    #[test]
    fn truncated_model_is_an_input_error() {
        let json = r#"{
            "model": {"kind": "log-parabola", "parameters": [{"name": "amplitude", "value": 1e-11}]},
            "instruments": [
                {"name": "magic", "label": "MAGIC", "datasets": ["m1.json"],
                 "style": {"color": [105, 105, 105], "marker": "circle"}}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        std::fs::write(&path, json).unwrap();
        let err = AnalysisConfig::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("expects parameters"), "{err}");

        let mut config = AnalysisConfig::from_profiles(&[InstrumentProfile::magic()]);
        config.model.parameters.pop();
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);
    }

    #[test]
    fn duplicate_instruments_rejected() {
        let mut config = AnalysisConfig::from_profiles(&[InstrumentProfile::lst()]);
        config.instruments.push(config.instruments[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_file() {
        let config = AnalysisConfig::from_profiles(&InstrumentProfile::presets());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        config.save(&path).unwrap();
        let back = AnalysisConfig::load(&path).unwrap();
        assert_eq!(back, config);
        assert_eq!(config_base_dir(&path), dir.path());
    }

    #[test]
    fn missing_dataset_file_is_an_input_error() {
        let config = AnalysisConfig::from_profiles(&[InstrumentProfile::hess()]);
        let dir = tempfile::tempdir().unwrap();
        let err = config.load_datasets(dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
