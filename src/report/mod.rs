//! Textual summaries printed after each pipeline stage.

pub mod format;

pub use format::*;
