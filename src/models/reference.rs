//! Literature Crab Nebula spectra drawn as reference curves.

use serde::{Deserialize, Serialize};

use crate::domain::{colors, EnergyRange};
use crate::models::spectral::SpectralModel;

/// A fixed literature spectrum with its validity range and plot style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCurve {
    pub label: String,
    pub model: SpectralModel,
    pub range: EnergyRange,
    pub color: [u8; 3],
    #[serde(default = "default_dashed")]
    pub dashed: bool,
}

fn default_dashed() -> bool {
    true
}

/// Meyer et al. (2010) broadband Crab fit.
pub fn crab_meyer(range: EnergyRange) -> ReferenceCurve {
    let mut model = SpectralModel::meyer_crab();
    model.freeze_all();
    ReferenceCurve {
        label: "Meyer et al. (2010)".to_string(),
        model,
        range,
        color: colors::BLACK,
        dashed: true,
    }
}

/// MAGIC Collaboration (2015) log-parabola.
///
/// The published curvature is quoted for `log10`; the model uses `ln`, hence
/// the `1 / ln 10` factor.
pub fn crab_magic_lp(range: EnergyRange) -> ReferenceCurve {
    let mut model = SpectralModel::log_parabola(3.23e-11, 1.0, 2.47, 0.24 / std::f64::consts::LN_10);
    model.freeze_all();
    ReferenceCurve {
        label: "MAGIC Collaboration (2015)".to_string(),
        model,
        range,
        color: colors::DODGERBLUE,
        dashed: true,
    }
}

/// The default pair of reference curves over `range`.
pub fn default_references(range: EnergyRange) -> Vec<ReferenceCurve> {
    vec![crab_meyer(range), crab_magic_lp(range)]
}
