//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads (or simulates) the instrument datasets
//! - runs the joint fit and per-instrument flux points
//! - prints reports, draws the SED and writes optional exports

use std::fs;
use std::path::Path;

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, SimulateArgs};
use crate::data::{simulate_instrument, InstrumentProfile};
use crate::error::AppError;
use crate::io::{config_base_dir, write_dataset_json, AnalysisConfig};

pub mod pipeline;

pub use pipeline::{ChartOptions, RunOutput};

/// Entry point for the `crab-sed` binary.
pub fn run() -> Result<(), AppError> {
    // `crab-sed` and `crab-sed --show` behave like `crab-sed fit ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Fit(args) => handle_fit(args),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let profiles = InstrumentProfile::presets();
    let truth = pipeline::simulation_truth()?;

    for profile in &profiles {
        let dir = args.out.join(&profile.name);
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;
        let datasets = simulate_instrument(profile, &truth, args.seed)?;
        for ds in &datasets {
            write_dataset_json(&dir.join(format!("{}.json", ds.name)), ds)?;
        }
        println!(
            "{:<10} {} dataset(s), {:.0} counts, {:.2}-{:.2} TeV",
            profile.label,
            datasets.len(),
            datasets.iter().map(|d| d.total_counts()).sum::<f64>(),
            profile.e_min,
            profile.e_max
        );
    }

    let config_path = args.out.join("analysis.json");
    AnalysisConfig::from_profiles(&profiles).save(&config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let (mut config, inputs) = match &args.config {
        Some(path) => {
            let config = AnalysisConfig::load(path)?;
            let inputs = config.load_datasets(&config_base_dir(path))?;
            (config, inputs)
        }
        None => {
            info!("No --config given, simulating datasets (seed {})", args.seed);
            pipeline::simulate_inputs(&InstrumentProfile::presets(), args.seed)?
        }
    };
    apply_overrides(&mut config, &args);

    let run = pipeline::run_analysis(&config, inputs)?;
    let sed_type = config.sed_type;

    println!("{}", crate::report::format_datasets(&run.datasets));
    println!("{}", crate::report::format_fit_result(&run.fit));
    println!("{}", crate::report::format_model(&run.model.snapshot()));
    for inst in &run.instruments {
        if let Some(refit) = &inst.refit {
            println!("Re-fit on {} only:", inst.label);
            println!("{}", crate::report::format_fit_result(refit));
        }
        println!(
            "{}",
            crate::report::format_flux_points(&inst.label, &inst.flux_points, sed_type)
        );
        let successful = inst.flux_points.iter().filter(|p| p.success);
        let (ts, dof) = successful.fold((0.0, 0.0), |(ts, dof), p| (ts + p.ts, dof + 1.0));
        println!("{}\n", crate::report::format_significance(ts, dof));
    }

    let mut options = ChartOptions::new(sed_type);
    options.references = !args.no_references;

    if let Some(path) = &args.svg {
        let chart = run.sed_chart(&options);
        crate::plot::write_svg(path, &chart, crate::plot::SVG_SIZE)?;
        info!("Wrote SED plot to {}", path.display());
    }

    if let Some(dir) = &args.export_flux_points {
        export_flux_points(dir, &run, sed_type)?;
    }
    if let Some(path) = &args.export_result {
        let names = run.datasets.names().into_iter().map(str::to_string).collect();
        crate::io::export::write_result_json(path, &run.fit, &run.model.snapshot(), names)?;
        info!("Wrote fit result to {}", path.display());
    }

    if args.show {
        crate::tui::run(&run, options)?;
    }

    Ok(())
}

fn apply_overrides(config: &mut AnalysisConfig, args: &FitArgs) {
    if let Some(model) = args.flux_points_model {
        config.flux_point_model = model;
    }
    if let Some(sed_type) = args.sed_type {
        config.sed_type = sed_type;
    }
    if let Some(selection) = args.selection {
        config.selection_optional = selection;
    }
}

fn export_flux_points(dir: &Path, run: &RunOutput, sed_type: crate::domain::SedType) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;
    for inst in &run.instruments {
        let path = dir.join(format!("{}_flux_points.csv", inst.name));
        crate::io::export::write_flux_points_csv(&path, &inst.flux_points, sed_type)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

/// Rewrite argv so `crab-sed` defaults to `crab-sed fit`.
///
/// Rules:
/// - `crab-sed`                      -> `crab-sed fit`
/// - `crab-sed --show ...`           -> `crab-sed fit --show ...`
/// - `crab-sed --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "simulate");
    if is_subcommand {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
        return argv;
    }

    argv
}
