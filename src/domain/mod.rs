//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - energy binning (`EnergyEdges`, `EnergyRange`)
//! - reporting/plotting conventions (`SedType`, `SeriesStyle`)
//! - analysis flow switches (`FluxPointModel`)

pub mod types;

pub use types::*;
