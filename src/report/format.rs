//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting/estimation code stays clean and testable
//! - output changes are localized

use crate::datasets::Datasets;
use crate::domain::SedType;
use crate::estimators::FluxPoints;
use crate::fit::FitResult;
use crate::math::ts_p_value;
use crate::models::SkyModel;

/// Per-dataset summary table (counts, background, excess, safe bins, statistic).
pub fn format_datasets(datasets: &Datasets) -> String {
    let mut out = String::new();
    out.push_str(&format!("Datasets: n={}\n", datasets.len()));
    push_row(
        &mut out,
        format!(
            "{:<16} {:<10} {:>6} {:>10} {:>10} {:>10} {:>15} {:>12}",
            "name", "instrument", "bins", "counts", "bkg", "excess", "energy [TeV]", "stat"
        ),
    );
    push_row(
        &mut out,
        format!("{:-<16} {:-<10} {:->6} {:->10} {:->10} {:->10} {:->15} {:->12}", "", "", "", "", "", "", "", ""),
    );
    for ds in datasets {
        let info = ds.info();
        push_row(
            &mut out,
            format!(
                "{:<16} {:<10} {:>6} {:>10.0} {:>10.1} {:>10.1} {:>15} {:>12}",
                truncate(&info.name, 16),
                truncate(&info.instrument, 10),
                format!("{}/{}", info.n_bins_safe, info.n_bins),
                info.counts,
                info.background,
                info.excess,
                format!("{:.2}-{:.2}", info.e_min, info.e_max),
                info.stat_sum.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string()),
            ),
        );
    }
    out
}

/// Fit status block followed by the parameter table.
pub fn format_fit_result(fit: &FitResult) -> String {
    let mut out = fit.to_string();
    out.push('\n');
    push_row(
        &mut out,
        format!("{:<12} {:>14} {:>14} {:<16} {:>6}", "name", "value", "error", "unit", "frozen"),
    );
    push_row(&mut out, format!("{:-<12} {:->14} {:->14} {:-<16} {:->6}", "", "", "", "", ""));
    for p in &fit.parameters {
        push_row(
            &mut out,
            format!(
                "{:<12} {:>14} {:>14} {:<16} {:>6}",
                truncate(&p.name, 12),
                fmt_sci(p.value),
                if p.frozen { "-".to_string() } else { fmt_sci(p.error) },
                truncate(&p.unit, 16),
                p.frozen,
            ),
        );
    }
    out
}

/// Model description with bounds, in the order the parameters are defined.
pub fn format_model(model: &SkyModel) -> String {
    let spectral = &model.spectral;
    let mut out = String::new();
    out.push_str(&format!("SkyModel: {}\n", model.name));
    out.push_str(&format!("  Spectral model type : {}\n", spectral.kind.display_name()));
    out.push_str("  Parameters:\n");
    for p in &spectral.parameters {
        let error = if p.frozen {
            "(frozen)".to_string()
        } else {
            format!("+/- {}", fmt_sci(p.error))
        };
        push_row(
            &mut out,
            format!("    {:<12} : {:>12} {:<14} {}", p.name, fmt_sci(p.value), error, p.unit),
        );
    }
    out
}

/// Flux point table for one instrument.
pub fn format_flux_points(label: &str, points: &FluxPoints, sed_type: SedType) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Flux points: {label} ({} bins, {} successful) [{}]\n",
        points.len(),
        points.n_successful(),
        sed_type.unit_label()
    ));
    push_row(
        &mut out,
        format!(
            "{:>8} {:>8} {:>8} {:>8} {:>8} {:>11} {:>11} {:>11} {:>8} {:>3}",
            "e_min", "e_max", "e_ref", "norm", "err", "flux", "flux_errn", "flux_errp", "sqrt_ts", "ul"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:->8} {:->8} {:->8} {:->8} {:->8} {:->11} {:->11} {:->11} {:->8} {:->3}",
            "", "", "", "", "", "", "", "", "", ""
        ),
    );
    for p in points.iter() {
        let sed = p.sed(sed_type);
        let (flux, errn, errp) = if p.is_ul {
            (sed.ul, f64::NAN, f64::NAN)
        } else {
            (sed.value, sed.errn, sed.errp)
        };
        push_row(
            &mut out,
            format!(
                "{:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>11} {:>11} {:>11} {:>8.2} {:>3}",
                p.e_min,
                p.e_max,
                p.e_ref,
                p.norm,
                p.norm_err,
                fmt_sci(flux),
                fmt_sci(errn),
                fmt_sci(errp),
                p.sqrt_ts,
                if p.is_ul { "*" } else { "" },
            ),
        );
    }
    out
}

/// One-line goodness-of-fit note for a TS with `dof` degrees of freedom.
pub fn format_significance(ts: f64, dof: f64) -> String {
    match ts_p_value(ts, dof) {
        Some(p) => format!("TS={ts:.1} (dof={dof}) p={p:.3e}"),
        None => format!("TS={ts:.1} (dof={dof})"),
    }
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_sci(v: f64) -> String {
    if !v.is_finite() {
        return "nan".to_string();
    }
    if v != 0.0 && (v.abs() < 1e-3 || v.abs() >= 1e4) {
        format!("{v:.3e}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::SpectrumDataset;
    use crate::domain::EnergyEdges;
    use crate::fit::ParameterSnapshot;
    use crate::models::{ModelHandle, SpectralModel};

    #[test]
    fn datasets_table_lists_every_member() {
        let edges = EnergyEdges::new(vec![1.0, 2.0, 4.0]).unwrap();
        let a = SpectrumDataset::new("hess-obs01", "H.E.S.S.", edges.clone(), vec![3.0, 1.0], vec![1e11; 2], vec![0.5; 2])
            .unwrap();
        let b = SpectrumDataset::new("magic-obs01", "MAGIC", edges, vec![2.0, 2.0], vec![1e11; 2], vec![0.5; 2]).unwrap();
        let mut joint = Datasets::new(vec![a, b]);
        let handle = ModelHandle::new(SkyModel::new("CrabNebula", SpectralModel::power_law(2.0, 1e-11, 1.0)));
        joint.set_models(&handle);

        let text = format_datasets(&joint);
        assert!(text.starts_with("Datasets: n=2"));
        assert!(text.contains("hess-obs01"));
        assert!(text.contains("magic-obs01"));
        assert!(text.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn fit_table_marks_frozen_parameters() {
        let fit = FitResult {
            success: true,
            message: "Optimization terminated successfully.".to_string(),
            n_iterations: 42,
            total_stat: 10.0,
            parameters: vec![
                ParameterSnapshot {
                    model: "CrabNebula".to_string(),
                    name: "index".to_string(),
                    value: 2.5,
                    error: 0.05,
                    unit: String::new(),
                    frozen: false,
                },
                ParameterSnapshot {
                    model: "CrabNebula".to_string(),
                    name: "reference".to_string(),
                    value: 1.0,
                    error: 0.0,
                    unit: "TeV".to_string(),
                    frozen: true,
                },
            ],
            covariance: None,
        };
        let text = format_fit_result(&fit);
        assert!(text.contains("OptimizeResult"));
        let reference = text.lines().find(|l| l.starts_with("reference")).unwrap();
        assert!(reference.contains(" - "));
    }

    #[test]
    fn model_block_names_type() {
        let model = SkyModel::new("CrabNebula", SpectralModel::log_parabola(3e-11, 1.0, 2.5, 0.1));
        let text = format_model(&model);
        assert!(text.contains("CrabNebula"));
        assert!(text.contains("alpha"));
        assert!(text.contains("(frozen)"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_sci(2.5), "2.5000");
        assert_eq!(fmt_sci(3.2e-11), "3.200e-11");
        assert_eq!(fmt_sci(f64::NAN), "nan");
        assert_eq!(truncate("abcdef", 4), "abc.");
    }
}
