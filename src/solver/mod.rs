//! Distributed triangular solve with supernodal L and U factors.
//!
//! Control flow of one solve: B is scattered into X ([`redistribute`]),
//! the forward sweep ([`lsolve`]) and the backward sweep ([`usolve`]) run
//! the self-scheduling loop of [`engine`] over X, and X is gathered back
//! into B. Diagonal inverses ([`diag_inv`]) are computed once per
//! factorization when enabled.

pub mod diag_inv;
pub mod redistribute;
pub mod workspace;

pub(crate) mod deps;
pub(crate) mod engine;
pub(crate) mod lsolve;
pub(crate) mod topology;
pub(crate) mod usolve;

pub use diag_inv::{compute_diag_inverses, compute_diag_inverses_on_grid};
pub use redistribute::{CommPattern, Exchange, Permutations, RhsBlock, b_to_x, x_to_b};
pub use workspace::{BlockVec, XBlock};

use crate::config::SolveOptions;
use crate::core::DenseKernels;
use crate::error::GsError;
use crate::matrix::{LocalFactors, SupernodePartition};
use crate::parallel::GridComm;
use crate::utils::SolveStats;
use crate::utils::stats::timed;

/// Forward sweep `X <- L^{-1} X`. Collective.
pub fn forward_solve<C: GridComm + ?Sized, K: DenseKernels>(
    comm: &C,
    partition: &SupernodePartition,
    factors: &LocalFactors,
    kernels: &K,
    x: &mut BlockVec,
    options: &SolveOptions,
    stats: &mut SolveStats,
) -> Result<(), GsError> {
    let sweep = lsolve::LSweep {
        grid: comm.grid(),
        partition,
        factors,
        kernels,
        use_inverse: options.diag_inverse,
    };
    let mut elapsed = 0.0;
    let res = timed(&mut elapsed, || engine::run_sweep(comm, partition, &sweep, x, options, stats));
    stats.forward_time += elapsed;
    res
}

/// Backward sweep `X <- U^{-1} X`. Collective.
pub fn backward_solve<C: GridComm + ?Sized, K: DenseKernels>(
    comm: &C,
    partition: &SupernodePartition,
    factors: &LocalFactors,
    kernels: &K,
    x: &mut BlockVec,
    options: &SolveOptions,
    stats: &mut SolveStats,
) -> Result<(), GsError> {
    let sweep = usolve::USweep::new(comm.grid(), partition, factors, kernels, options.diag_inverse);
    let mut elapsed = 0.0;
    let res = timed(&mut elapsed, || engine::run_sweep(comm, partition, &sweep, x, options, stats));
    stats.backward_time += elapsed;
    res
}
