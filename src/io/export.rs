//! Result exports.
//!
//! - flux points per instrument as CSV (one row per energy bin)
//! - the joint fit result plus the fitted model as JSON

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::SedType;
use crate::error::AppError;
use crate::estimators::FluxPoints;
use crate::fit::FitResult;
use crate::models::SkyModel;

#[derive(Debug, Clone, Serialize)]
struct FluxPointRow {
    e_ref: f64,
    e_min: f64,
    e_max: f64,
    norm: f64,
    norm_err: f64,
    norm_errn: f64,
    norm_errp: f64,
    norm_ul: f64,
    ts: f64,
    sqrt_ts: f64,
    counts: f64,
    npred_background: f64,
    is_ul: bool,
    success: bool,
    sed_type: SedType,
    flux: f64,
    flux_errn: f64,
    flux_errp: f64,
    flux_ul: f64,
}

/// Write one instrument's flux points to CSV, with fluxes in `sed_type` units.
pub fn write_flux_points_csv(path: &Path, points: &FluxPoints, sed_type: SedType) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create flux point CSV '{}': {e}", path.display())))?;

    for p in points.iter() {
        let sed = p.sed(sed_type);
        writer
            .serialize(FluxPointRow {
                e_ref: p.e_ref,
                e_min: p.e_min,
                e_max: p.e_max,
                norm: p.norm,
                norm_err: p.norm_err,
                norm_errn: p.norm_errn,
                norm_errp: p.norm_errp,
                norm_ul: p.norm_ul,
                ts: p.ts,
                sqrt_ts: p.sqrt_ts,
                counts: p.counts,
                npred_background: p.npred_background,
                is_ul: p.is_ul,
                success: p.success,
                sed_type,
                flux: sed.value,
                flux_errn: sed.errn,
                flux_errp: sed.errp,
                flux_ul: sed.ul,
            })
            .map_err(|e| AppError::new(2, format!("Failed to write flux point CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush flux point CSV: {e}")))
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultFile<'a> {
    pub tool: &'static str,
    pub created: DateTime<Utc>,
    pub datasets: Vec<String>,
    pub fit: &'a FitResult,
    pub model: &'a SkyModel,
}

/// Write the joint fit result and the fitted model to JSON.
pub fn write_result_json(
    path: &Path,
    fit: &FitResult,
    model: &SkyModel,
    datasets: Vec<String>,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    let out = ResultFile {
        tool: env!("CARGO_PKG_NAME"),
        created: Utc::now(),
        datasets,
        fit,
        model,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &out)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::FluxPoint;
    use crate::models::SpectralModel;

    fn points() -> FluxPoints {
        let model = SpectralModel::power_law(2.0, 1e-11, 1.0);
        FluxPoints {
            source: "CrabNebula".to_string(),
            reference: model.clone(),
            points: vec![FluxPoint {
                e_min: 1.0,
                e_max: 4.0,
                e_ref: 2.0,
                ref_dnde: model.evaluate(2.0),
                norm: 1.0,
                norm_err: 0.1,
                norm_errn: f64::NAN,
                norm_errp: f64::NAN,
                norm_ul: 1.2,
                ts: 50.0,
                sqrt_ts: 50f64.sqrt(),
                stat: 1.0,
                stat_null: 51.0,
                counts: 40.0,
                npred_background: 2.0,
                n_bins: 3,
                is_ul: false,
                success: true,
                stat_scan: None,
            }],
        }
    }

    #[test]
    fn flux_point_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fp.csv");
        write_flux_points_csv(&path, &points(), SedType::Dnde).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "e_ref");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        let flux_idx = headers.iter().position(|h| h == "flux").unwrap();
        let flux: f64 = rows[0][flux_idx].parse().unwrap();
        assert!((flux - 2.5e-12).abs() < 1e-20);
    }

    #[test]
    fn result_json_embeds_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let fit = FitResult {
            success: true,
            message: "converged".to_string(),
            n_iterations: 10,
            total_stat: 12.5,
            parameters: Vec::new(),
            covariance: None,
        };
        let model = SkyModel::new("CrabNebula", SpectralModel::power_law(2.0, 1e-11, 1.0));
        write_result_json(&path, &fit, &model, vec!["H1".to_string()]).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["model"]["name"], "CrabNebula");
        assert_eq!(value["fit"]["success"], true);
        assert_eq!(value["datasets"][0], "H1");
    }
}
