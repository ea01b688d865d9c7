//! SED plotting.
//!
//! - `sed`: backend-independent chart data (`SedChart`)
//! - `draw`: Plotters rendering shared by the SVG writer and the terminal viewer

pub mod draw;
pub mod sed;

pub use draw::*;
pub use sed::*;
