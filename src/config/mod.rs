//! Solve configuration.

pub mod options;
pub use options::{SolveOptions, Trace};
