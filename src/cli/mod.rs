//! Command-line parsing for the joint SED analysis.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting/estimation code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{FluxPointModel, SedType};
use crate::estimators::SelectionOptional;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "crab-sed",
    version,
    about = "Joint H.E.S.S. / MAGIC / LST spectral fit and flux points"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate datasets for the three instruments and write them with an analysis config.
    Simulate(SimulateArgs),
    /// Run the joint fit and flux point estimation, print summaries and optionally plot/export.
    Fit(FitArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output directory (one sub-directory per instrument plus `analysis.json`).
    #[arg(short, long, default_value = "crab-data")]
    pub out: PathBuf,

    /// Random seed for the Poisson counts.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Analysis config JSON. Without it, datasets are simulated in memory.
    #[arg(short, long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Seed for the in-memory simulation (ignored with --config).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Model the per-instrument flux points are computed against.
    #[arg(long, value_enum)]
    pub flux_points_model: Option<FluxPointModel>,

    /// Flux quantity for tables, plots and exports.
    #[arg(long, value_enum)]
    pub sed_type: Option<SedType>,

    /// Optional flux point quantities: `all`, `none`, or a list of `errn-errp,ul,scan`.
    #[arg(long, value_name = "LIST")]
    pub selection: Option<SelectionOptional>,

    /// Write the SED plot to an SVG file.
    #[arg(long, value_name = "SVG")]
    pub svg: Option<PathBuf>,

    /// Open the interactive SED viewer in the terminal.
    #[arg(long)]
    pub show: bool,

    /// Do not draw the literature reference spectra.
    #[arg(long)]
    pub no_references: bool,

    /// Export per-instrument flux points as CSV into this directory.
    #[arg(long = "export-flux-points", value_name = "DIR")]
    pub export_flux_points: Option<PathBuf>,

    /// Export the joint fit result and model as JSON.
    #[arg(long = "export-result", value_name = "JSON")]
    pub export_result: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_flags_parse() {
        let cli = Cli::parse_from([
            "crab-sed",
            "fit",
            "--flux-points-model",
            "per-instrument",
            "--sed-type",
            "dnde",
            "--selection",
            "ul,scan",
            "--svg",
            "sed.svg",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.flux_points_model, Some(FluxPointModel::PerInstrument));
        assert_eq!(args.sed_type, Some(SedType::Dnde));
        let selection = args.selection.unwrap();
        assert!(selection.ul && selection.scan && !selection.errn_errp);
        assert_eq!(args.svg, Some(PathBuf::from("sed.svg")));
        assert!(args.config.is_none());
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::parse_from(["crab-sed", "simulate"]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.seed, 42);
        assert_eq!(args.out, PathBuf::from("crab-data"));
    }
}
