//! `crab-sed` library crate.
//!
//! Joint spectral fit of gamma-ray observations from several instruments
//! (H.E.S.S., MAGIC, LST) with one shared source model, followed by flux
//! points per instrument and an SED plot.
//!
//! The binary (`crab-sed`) is a thin wrapper around this library so that the
//! pipeline is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod estimators;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod tui;
