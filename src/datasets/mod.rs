//! Observation datasets and joint collections.
//!
//! - `dataset`: one binned 1D spectrum with exposure/background (`SpectrumDataset`)
//! - `collection`: the ordered joint collection (`Datasets`), aggregation and model binding

pub mod collection;
pub mod dataset;

pub use collection::*;
pub use dataset::*;
