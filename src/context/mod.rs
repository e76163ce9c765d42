//! Context module for the distributed triangular solve.
//!
//! - [`solve_context`]: the `SolveContext` holding one rank's factors,
//!   permutations, communication pattern and options, plus the `gstrs`
//!   status-code entry point.

pub mod solve_context;
pub use solve_context::{SolveContext, gstrs};
