//! gstrs: distributed supernodal triangular solve on a 2D process grid.
//!
//! Given the block-sparse L and U factors of a distributed sparse LU
//! factorization, this crate solves `A X = B` for a right-hand side
//! distributed by rows: B is scattered onto the diagonal processes, a
//! message-driven forward sweep and backward sweep run over broadcast and
//! reduction trees, and the solution is gathered back into B. Dense block
//! kernels come from faer; transports are an in-process thread grid and,
//! with the `mpi` feature, MPI.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use core::*;
pub use error::*;
pub use matrix::*;
pub use solver::*;
pub use utils::*;
