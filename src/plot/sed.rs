//! Render-ready description of a spectral energy distribution chart.
//!
//! Everything here is plain data: curves are sampled, bands are evaluated and
//! flux points are converted to the requested SED type before any backend is
//! involved. The same [`SedChart`] is drawn into SVG files and into the
//! terminal viewer.

use crate::domain::{EnergyRange, SedType, SeriesStyle};
use crate::estimators::FluxPoints;
use crate::models::{ReferenceCurve, SpectralModel};

/// Number of log-spaced samples used for model curves.
pub const CURVE_SAMPLES: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CurveSeries {
    pub label: String,
    pub color: [u8; 3],
    pub dashed: bool,
    pub points: Vec<(f64, f64)>,
}

/// 1σ band around the fitted model: `(energy, lower, upper)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSeries {
    pub color: [u8; 3],
    pub alpha: f64,
    pub points: Vec<(f64, f64, f64)>,
}

impl BandSeries {
    /// Closed outline: upper edge left to right, then lower edge back.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        let upper = self.points.iter().map(|&(e, _, hi)| (e, hi));
        let lower = self.points.iter().rev().map(|&(e, lo, _)| (e, lo));
        upper.chain(lower).filter(|&(_, y)| y > 0.0 && y.is_finite()).collect()
    }
}

/// One flux point converted to plot units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SedMarker {
    pub e_ref: f64,
    pub e_min: f64,
    pub e_max: f64,
    pub value: f64,
    pub errn: f64,
    pub errp: f64,
    pub is_ul: bool,
    pub ul: f64,
}

impl SedMarker {
    /// Lower end of the error bar, kept positive for log axes.
    pub fn y_low(&self) -> f64 {
        let lo = self.value - self.errn;
        if lo > 0.0 { lo } else { self.value * 0.5 }
    }

    pub fn y_high(&self) -> f64 {
        self.value + self.errp
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointSeries {
    pub label: String,
    pub style: SeriesStyle,
    pub markers: Vec<SedMarker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SedChart {
    pub title: Option<String>,
    pub sed_type: SedType,
    pub range: EnergyRange,
    pub references: Vec<CurveSeries>,
    pub model: Option<CurveSeries>,
    pub band: Option<BandSeries>,
    pub flux_points: Vec<PointSeries>,
}

impl SedChart {
    pub fn new(sed_type: SedType, range: EnergyRange) -> Self {
        Self {
            title: None,
            sed_type,
            range,
            references: Vec::new(),
            model: None,
            band: None,
            flux_points: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add literature curves, each sampled over its own validity range.
    pub fn with_references(mut self, references: &[ReferenceCurve]) -> Self {
        for r in references {
            self.references.push(CurveSeries {
                label: r.label.clone(),
                color: r.color,
                dashed: r.dashed,
                points: r.model.sample(r.range, CURVE_SAMPLES, self.sed_type),
            });
        }
        self
    }

    /// Add the fitted model as a solid line plus its error band.
    pub fn with_model(mut self, label: impl Into<String>, model: &SpectralModel, color: [u8; 3]) -> Self {
        self.model = Some(CurveSeries {
            label: label.into(),
            color,
            dashed: false,
            points: model.sample(self.range, CURVE_SAMPLES, self.sed_type),
        });
        if model.covariance.is_some() {
            self.band = Some(BandSeries {
                color,
                alpha: 0.4,
                points: model.sample_band(self.range, CURVE_SAMPLES, self.sed_type),
            });
        }
        self
    }

    /// Add one instrument's flux points; unsuccessful bins are skipped.
    pub fn with_flux_points(mut self, label: impl Into<String>, style: SeriesStyle, points: &FluxPoints) -> Self {
        let markers = points
            .iter()
            .filter(|p| p.success)
            .map(|p| {
                let sed = p.sed(self.sed_type);
                SedMarker {
                    e_ref: p.e_ref,
                    e_min: p.e_min,
                    e_max: p.e_max,
                    value: sed.value,
                    errn: sed.errn,
                    errp: sed.errp,
                    is_ul: p.is_ul && sed.ul.is_finite(),
                    ul: sed.ul,
                }
            })
            .collect();
        self.flux_points.push(PointSeries {
            label: label.into(),
            style,
            markers,
        });
        self
    }

    /// Energy bounds covering the chart range and every flux point bin.
    pub fn x_bounds(&self) -> [f64; 2] {
        let mut lo = self.range.e_min;
        let mut hi = self.range.e_max;
        for m in self.flux_points.iter().flat_map(|s| &s.markers) {
            lo = lo.min(m.e_min);
            hi = hi.max(m.e_max);
        }
        [lo, hi]
    }

    /// Flux bounds from all positive values, padded by half a decade.
    pub fn y_bounds(&self) -> [f64; 2] {
        let curves = self
            .references
            .iter()
            .chain(self.model.iter())
            .flat_map(|c| c.points.iter().map(|&(_, y)| y));
        let band = self.band.iter().flat_map(|b| b.points.iter().flat_map(|&(_, lo, hi)| [lo, hi]));
        let markers = self.flux_points.iter().flat_map(|s| &s.markers).flat_map(|m| {
            if m.is_ul {
                [m.ul, m.ul * 0.4]
            } else {
                [m.y_low(), m.y_high()]
            }
        });

        let (lo, hi) = curves
            .chain(band)
            .chain(markers)
            .filter(|y| y.is_finite() && *y > 0.0)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));

        if !(lo.is_finite() && hi.is_finite()) {
            return [1e-14, 1e-9];
        }
        let pad = 10f64.powf(0.5);
        if hi > lo { [lo / pad, hi * pad] } else { [lo / 10.0, lo * 10.0] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{colors, EnergyEdges, MarkerKind};
    use crate::estimators::{FluxPoint, FluxPoints};
    use crate::models::{default_references, ModelCovariance};

    fn range() -> EnergyRange {
        EnergyRange::new(0.1, 30.0).unwrap()
    }

    fn flux_points(model: &SpectralModel) -> FluxPoints {
        let edges = EnergyEdges::new(vec![1.0, 2.0, 4.0]).unwrap();
        let points = edges
            .bins()
            .map(|(lo, hi)| FluxPoint {
                e_min: lo,
                e_max: hi,
                e_ref: (lo * hi).sqrt(),
                ref_dnde: model.evaluate((lo * hi).sqrt()),
                norm: 1.0,
                norm_err: 0.1,
                norm_errn: 0.1,
                norm_errp: 0.12,
                norm_ul: 1.3,
                ts: if lo > 1.5 { 1.0 } else { 100.0 },
                sqrt_ts: 10.0,
                stat: 0.0,
                stat_null: 100.0,
                counts: 100.0,
                npred_background: 1.0,
                n_bins: 1,
                is_ul: lo > 1.5,
                success: true,
                stat_scan: None,
            })
            .collect();
        FluxPoints {
            source: "CrabNebula".to_string(),
            reference: model.clone(),
            points,
        }
    }

    #[test]
    fn band_only_with_covariance() {
        let mut model = SpectralModel::power_law(2.5, 3e-11, 1.0);
        let chart = SedChart::new(SedType::E2dnde, range()).with_model("fit", &model, colors::GRAY);
        assert!(chart.band.is_none());

        model.covariance = Some(ModelCovariance {
            indices: vec![1],
            matrix: vec![vec![1e-24]],
        });
        let chart = SedChart::new(SedType::E2dnde, range()).with_model("fit", &model, colors::GRAY);
        let band = chart.band.unwrap();
        assert_eq!(band.points.len(), CURVE_SAMPLES);
        assert_eq!(band.outline().len(), 2 * CURVE_SAMPLES);
    }

    #[test]
    fn references_use_their_own_range() {
        let narrow = EnergyRange::new(0.5, 5.0).unwrap();
        let chart = SedChart::new(SedType::E2dnde, range()).with_references(&default_references(narrow));
        assert_eq!(chart.references.len(), 2);
        let first = chart.references[0].points.first().unwrap().0;
        assert!((first - 0.5).abs() < 1e-12);
        assert!(chart.references.iter().all(|c| c.dashed));
    }

    #[test]
    fn markers_follow_flux_points() {
        let model = SpectralModel::power_law(2.5, 3e-11, 1.0);
        let style = SeriesStyle::new(colors::TEAL, MarkerKind::Circle);
        let chart = SedChart::new(SedType::Dnde, range()).with_flux_points("HESS", style, &flux_points(&model));
        let markers = &chart.flux_points[0].markers;
        assert_eq!(markers.len(), 2);
        assert!(!markers[0].is_ul);
        assert!(markers[1].is_ul);
        assert!((markers[0].value - model.evaluate(2f64.sqrt())).abs() < 1e-20);
    }

    #[test]
    fn y_bounds_enclose_all_series() {
        let model = SpectralModel::power_law(2.5, 3e-11, 1.0);
        let style = SeriesStyle::new(colors::TEAL, MarkerKind::Circle);
        let chart = SedChart::new(SedType::E2dnde, range())
            .with_references(&default_references(range()))
            .with_model("fit", &model, colors::GRAY)
            .with_flux_points("HESS", style, &flux_points(&model));
        let [lo, hi] = chart.y_bounds();
        assert!(lo > 0.0 && hi > lo);
        for (_, y) in &chart.model.as_ref().unwrap().points {
            assert!(*y >= lo && *y <= hi);
        }
        assert_eq!(chart.x_bounds(), [0.1, 30.0]);
    }
}
