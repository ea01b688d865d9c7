//! Spectral models, their parameters, and the shared handles datasets hold.
//!
//! Spectral shapes are implemented as small, pure functions (`model`) so that
//! fitting/estimation code can stay generic; `spectral` wraps them with a
//! parameter list, and `sky` adds the named source and shared ownership.

pub mod model;
pub mod parameter;
pub mod reference;
pub mod sky;
pub mod spectral;

pub use model::*;
pub use parameter::*;
pub use reference::*;
pub use sky::*;
pub use spectral::*;
