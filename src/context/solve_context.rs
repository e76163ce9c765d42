//! Solve context: everything a factorization hands to the triangular solve.
//!
//! `SolveContext` owns one process's share of the factors together with the
//! supernode partition, the permutations, the communication pattern of the
//! right-hand side and the solve options. [`SolveContext::solve`] runs the
//! complete solve on a distributed B and may be called any number of times;
//! the diagonal inverses are computed on the first call that needs them.
//!
//! # Usage
//!
//! 1. Build `LocalFactors` (e.g. with `distribute_factors`) and a
//!    `CommPattern` for the row distribution of B.
//! 2. Construct a `SolveContext` on every rank.
//! 3. Call `solve` (or the status-code wrapper [`gstrs`]) on every rank.

use crate::config::{SolveOptions, Trace};
use crate::core::{DenseKernels, FaerKernels, ProcessGrid};
use crate::error::GsError;
use crate::matrix::{LocalFactors, SupernodePartition};
use crate::parallel::GridComm;
use crate::solver::{
    BlockVec, CommPattern, Permutations, RhsBlock, b_to_x, backward_solve, compute_diag_inverses_on_grid,
    forward_solve, x_to_b,
};
use crate::utils::SolveStats;
use crate::utils::stats::timed;
use std::time::Instant;

/// Exit code passed to `GridComm::abort` on unrecoverable failures.
pub const ABORT_CODE: i32 = 1;

pub struct SolveContext<K: DenseKernels = FaerKernels> {
    grid: ProcessGrid,
    partition: SupernodePartition,
    factors: LocalFactors,
    perms: Permutations,
    pattern: CommPattern,
    /// Options read on every solve.
    pub options: SolveOptions,
    kernels: K,
}

impl SolveContext<FaerKernels> {
    /// Context using faer kernels with the parallelism of `options`.
    pub fn new(
        grid: ProcessGrid,
        partition: SupernodePartition,
        factors: LocalFactors,
        perms: Permutations,
        pattern: CommPattern,
        options: SolveOptions,
    ) -> Result<Self, GsError> {
        let kernels = FaerKernels::new(options.par());
        Self::with_kernels(grid, partition, factors, perms, pattern, options, kernels)
    }
}

impl<K: DenseKernels + Sync> SolveContext<K> {
    pub fn with_kernels(
        grid: ProcessGrid,
        partition: SupernodePartition,
        factors: LocalFactors,
        perms: Permutations,
        pattern: CommPattern,
        options: SolveOptions,
        kernels: K,
    ) -> Result<Self, GsError> {
        let nsupers = partition.nsupers();
        if factors.num_local_cols() != grid.num_local_cols(nsupers)
            || factors.num_local_rows() != grid.num_local_rows(nsupers)
        {
            return Err(GsError::invalid(2, "factors were laid out for another grid or partition"));
        }
        if perms.n() != partition.n() {
            return Err(GsError::invalid(3, format!("permutations of order {} for n = {}", perms.n(), partition.n())));
        }
        if pattern.row_to_proc.len() != partition.n() || pattern.b_to_x.send_counts.len() != grid.nprocs() {
            return Err(GsError::invalid(10, "communication pattern was computed for another system"));
        }
        Ok(SolveContext { grid, partition, factors, perms, pattern, options, kernels })
    }

    pub fn n(&self) -> usize {
        self.partition.n()
    }

    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    pub fn partition(&self) -> &SupernodePartition {
        &self.partition
    }

    pub fn factors(&self) -> &LocalFactors {
        &self.factors
    }

    /// Invert the diagonal blocks on every rank; a no-op once done. Collective.
    pub fn compute_diag_inverses<C: GridComm + ?Sized>(&mut self, comm: &C) -> Result<bool, GsError> {
        compute_diag_inverses_on_grid(comm, &self.partition, &mut self.factors, &self.kernels)
    }

    fn check_args(&self, comm_grid: ProcessGrid, b_len: usize, m_loc: usize, fst_row: usize, ldb: usize, nrhs: usize) -> Result<(), GsError> {
        let n = self.n();
        if comm_grid != self.grid {
            return Err(GsError::invalid(4, "communicator grid differs from the factor grid"));
        }
        if m_loc > n {
            return Err(GsError::invalid(6, format!("m_loc = {m_loc} exceeds n = {n}")));
        }
        if fst_row.checked_add(m_loc).is_none_or(|end| end > n) {
            return Err(GsError::invalid(7, format!("rows from {fst_row} run past n = {n}")));
        }
        if ldb < m_loc {
            return Err(GsError::invalid(8, format!("ldb = {ldb} is smaller than m_loc = {m_loc}")));
        }
        if nrhs > 0 && m_loc > 0 && b_len < ldb * (nrhs - 1) + m_loc {
            return Err(GsError::invalid(5, format!("B holds {b_len} values, {ldb} x {nrhs} needed")));
        }
        if self.pattern.m_loc != m_loc || self.pattern.fst_row != fst_row {
            return Err(GsError::invalid(10, "communication pattern was computed for another row distribution"));
        }
        Ok(())
    }

    /// Overwrite this rank's rows of B (column-major, leading dimension
    /// `ldb`) with the solution of `A X = B`. Collective over the grid.
    #[allow(clippy::too_many_arguments)]
    pub fn solve<C: GridComm + ?Sized>(
        &mut self,
        comm: &C,
        b: &mut [f64],
        m_loc: usize,
        fst_row: usize,
        ldb: usize,
        nrhs: usize,
        stats: &mut SolveStats,
    ) -> Result<(), GsError> {
        stats.reset();
        let start = Instant::now();
        self.check_args(comm.grid(), b.len(), m_loc, fst_row, ldb, nrhs)?;
        if nrhs == 0 {
            return Ok(());
        }
        if self.options.diag_inverse && !self.factors.has_inverses() {
            self.compute_diag_inverses(comm)?;
        }

        let mut rhs = RhsBlock { values: b, m_loc, fst_row, ldb, nrhs };
        let mut x = BlockVec::diagonal(&self.grid, &self.partition, nrhs);

        let scattered = timed(&mut stats.redistribute_time, || {
            b_to_x(comm, &self.partition, &self.perms, &self.pattern, &rhs, &mut x)
        });
        fatal_on_allocation(comm, scattered)?;

        forward_solve(comm, &self.partition, &self.factors, &self.kernels, &mut x, &self.options, stats)?;
        comm.barrier()?;
        backward_solve(comm, &self.partition, &self.factors, &self.kernels, &mut x, &self.options, stats)?;

        let gathered = timed(&mut stats.redistribute_time, || {
            x_to_b(comm, &self.partition, &self.pattern, &x, &mut rhs)
        });
        fatal_on_allocation(comm, gathered)?;
        comm.barrier()?;

        stats.total_time = start.elapsed().as_secs_f64();
        if self.options.trace.contains(Trace::TIMING) && self.grid.iam() == 0 {
            log::info!(
                target: "gstrs",
                "solve: total {:.3e}s, forward {:.3e}s, backward {:.3e}s, redistribute {:.3e}s, comm {:.3e}s, {:.3e} flops",
                stats.total_time,
                stats.forward_time,
                stats.backward_time,
                stats.redistribute_time,
                stats.comm_time,
                stats.ops
            );
        }
        Ok(())
    }
}

/// A half-done collective exchange cannot be recovered from: tear the
/// grid down.
fn fatal_on_allocation<C: GridComm + ?Sized>(comm: &C, res: Result<(), GsError>) -> Result<(), GsError> {
    if let Err(GsError::Allocation(what)) = &res {
        log::error!(target: "gstrs", "[{}] {what}", comm.rank());
        comm.abort(ABORT_CODE);
    }
    res
}

/// Solve entry point returning an integer status: 0 on success, `-i` when
/// argument `i` is illegal, `row + 1` for a zero pivot met while inverting
/// the diagonal blocks.
#[allow(clippy::too_many_arguments)]
pub fn gstrs<C: GridComm + ?Sized, K: DenseKernels + Sync>(
    n: usize,
    ctx: &mut SolveContext<K>,
    comm: &C,
    b: &mut [f64],
    m_loc: usize,
    fst_row: usize,
    ldb: usize,
    nrhs: usize,
    stats: &mut SolveStats,
) -> i32 {
    if n != ctx.n() {
        return GsError::invalid(1, format!("n = {n} but the factors have order {}", ctx.n())).info();
    }
    match ctx.solve(comm, b, m_loc, fst_row, ldb, nrhs, stats) {
        Ok(()) => 0,
        Err(e) => {
            log::warn!(target: "gstrs", "[{}] solve failed: {e}", comm.rank());
            e.info()
        }
    }
}
