//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and estimation
//! - written to and read from dataset / config JSON files
//! - exported alongside flux points and fit results

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// `1 TeV` expressed in erg.
pub const TEV_TO_ERG: f64 = 1.602_176_634;

/// Ordered energy bin boundaries in TeV.
///
/// Invariant: at least two edges, all finite and positive, strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EnergyEdges {
    edges: Vec<f64>,
}

impl EnergyEdges {
    pub fn new(edges: Vec<f64>) -> Result<Self, AppError> {
        if edges.len() < 2 {
            return Err(AppError::new(
                2,
                format!("Energy edges need at least 2 values, got {}.", edges.len()),
            ));
        }
        if edges.iter().any(|e| !e.is_finite() || *e <= 0.0) {
            return Err(AppError::new(2, "Energy edges must be finite and > 0."));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::new(2, "Energy edges must be strictly increasing."));
        }
        Ok(Self { edges })
    }

    /// `n_bins` equal-width bins in `log10(E)` between `e_min` and `e_max`.
    pub fn log_spaced(e_min: f64, e_max: f64, n_bins: usize) -> Result<Self, AppError> {
        if !(e_min.is_finite() && e_max.is_finite() && e_min > 0.0 && e_max > e_min) {
            return Err(AppError::new(
                2,
                format!("Invalid energy range: min={e_min}, max={e_max} (must be finite, >0, and max>min)."),
            ));
        }
        if n_bins == 0 {
            return Err(AppError::new(2, "Number of energy bins must be >= 1."));
        }

        let ln_min = e_min.ln();
        let step = (e_max.ln() - ln_min) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| (ln_min + step * i as f64).exp()).collect();
        // Pin the endpoints so round-trips through exp/ln don't drift.
        edges[0] = e_min;
        edges[n_bins] = e_max;
        Self::new(edges)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.edges
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn e_min(&self) -> f64 {
        self.edges[0]
    }

    pub fn e_max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// `(lo, hi)` pairs in bin order.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.edges.windows(2).map(|w| (w[0], w[1]))
    }

    /// Geometric bin centre.
    pub fn center(&self, bin: usize) -> f64 {
        (self.edges[bin] * self.edges[bin + 1]).sqrt()
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.center(i)).collect()
    }

    pub fn range(&self) -> EnergyRange {
        EnergyRange {
            e_min: self.e_min(),
            e_max: self.e_max(),
        }
    }
}

impl TryFrom<Vec<f64>> for EnergyEdges {
    type Error = AppError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        EnergyEdges::new(value)
    }
}

impl From<EnergyEdges> for Vec<f64> {
    fn from(value: EnergyEdges) -> Self {
        value.edges
    }
}

/// Closed energy interval (TeV), e.g. the validity range of a reference spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyRange {
    pub e_min: f64,
    pub e_max: f64,
}

impl EnergyRange {
    pub fn new(e_min: f64, e_max: f64) -> Result<Self, AppError> {
        if !(e_min.is_finite() && e_max.is_finite() && e_min > 0.0 && e_max > e_min) {
            return Err(AppError::new(
                2,
                format!("Invalid energy range [{e_min}, {e_max}] TeV."),
            ));
        }
        Ok(Self { e_min, e_max })
    }

    pub fn contains(&self, energy: f64) -> bool {
        energy >= self.e_min && energy <= self.e_max
    }

    /// `n` log-spaced energies covering the range (inclusive).
    pub fn log_grid(&self, n: usize) -> Vec<f64> {
        let n = n.max(2);
        let ln_min = self.e_min.ln();
        let step = (self.e_max.ln() - ln_min) / (n as f64 - 1.0);
        (0..n).map(|i| (ln_min + step * i as f64).exp()).collect()
    }
}

/// Which flux quantity is reported / plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SedType {
    /// Differential flux `dN/dE` in `cm-2 s-1 TeV-1`.
    Dnde,
    /// `E² dN/dE` in `erg cm-2 s-1`.
    E2dnde,
}

impl SedType {
    /// Convert a differential flux at `energy` into this SED representation.
    pub fn from_dnde(self, energy: f64, dnde: f64) -> f64 {
        match self {
            SedType::Dnde => dnde,
            SedType::E2dnde => energy * energy * dnde * TEV_TO_ERG,
        }
    }

    pub fn unit_label(self) -> &'static str {
        match self {
            SedType::Dnde => "cm-2 s-1 TeV-1",
            SedType::E2dnde => "erg cm-2 s-1",
        }
    }

    pub fn axis_label(self) -> &'static str {
        match self {
            SedType::Dnde => "dN/dE [cm-2 s-1 TeV-1]",
            SedType::E2dnde => "E2 dN/dE [erg cm-2 s-1]",
        }
    }
}

/// Which model the per-instrument flux points are computed against.
///
/// The two historical analysis flows differ here: one reuses the joint best-fit
/// model for every instrument, the other binds a copy of the model to each
/// instrument and re-fits it before estimating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FluxPointModel {
    /// Reuse the shared joint-fit model (parameters fixed from the joint fit).
    Joint,
    /// Deep-copy the joint model per instrument and re-fit it on that instrument.
    PerInstrument,
}

/// Marker shape used for an instrument's flux points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Circle,
    Square,
    Triangle,
    Cross,
}

/// RGB colour + marker for one plotted series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesStyle {
    pub color: [u8; 3],
    pub marker: MarkerKind,
}

impl SeriesStyle {
    pub const fn new(color: [u8; 3], marker: MarkerKind) -> Self {
        Self { color, marker }
    }
}

/// Named colours used by the presets and reference curves.
pub mod colors {
    pub const BLACK: [u8; 3] = [0, 0, 0];
    pub const GRAY: [u8; 3] = [128, 128, 128];
    pub const DIMGRAY: [u8; 3] = [105, 105, 105];
    pub const DODGERBLUE: [u8; 3] = [30, 144, 255];
    pub const DARKORANGE: [u8; 3] = [255, 140, 0];
    pub const TEAL: [u8; 3] = [0, 128, 128];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_reject_non_increasing() {
        assert!(EnergyEdges::new(vec![1.0, 2.0, 2.0]).is_err());
        assert!(EnergyEdges::new(vec![1.0]).is_err());
        assert!(EnergyEdges::new(vec![0.0, 1.0]).is_err());
        assert!(EnergyEdges::new(vec![1.0, 2.0, 4.0]).is_ok());
    }

    #[test]
    fn log_spaced_includes_endpoints() {
        let edges = EnergyEdges::log_spaced(0.1, 100.0, 3).unwrap();
        assert_eq!(edges.n_bins(), 3);
        assert!((edges.as_slice()[1] - 1.0).abs() < 1e-12);
        assert!((edges.as_slice()[2] - 10.0).abs() < 1e-12);
        assert_eq!(edges.e_max(), 100.0);
    }

    #[test]
    fn centers_are_geometric() {
        let edges = EnergyEdges::new(vec![1.0, 4.0]).unwrap();
        assert!((edges.center(0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn edges_deserialize_with_validation() {
        let ok: EnergyEdges = serde_json::from_str("[1.0, 2.0, 4.0]").unwrap();
        assert_eq!(ok.n_bins(), 2);
        assert!(serde_json::from_str::<EnergyEdges>("[4.0, 2.0]").is_err());
    }
}
