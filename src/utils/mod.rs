//! Utilities: solve statistics.

pub mod stats;
pub use stats::SolveStats;
