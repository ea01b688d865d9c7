//! Input/output helpers.
//!
//! - analysis configuration JSON (`config`)
//! - spectrum dataset JSON read/write (`dataset`)
//! - result exports (CSV/JSON) (`export`)

pub mod config;
pub mod dataset;
pub mod export;

pub use config::*;
pub use dataset::*;
pub use export::*;
