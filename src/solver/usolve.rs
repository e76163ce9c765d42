//! Backward sweep: solve `U x = y` in place in X.
//!
//! U is stored by block row, but a solved X(k) updates every block row with
//! a block in column `k`. The sweep therefore first indexes, per local block
//! column, the local U blocks lying in it.

use crate::core::{DenseKernels, ProcessGrid};
use crate::error::GsError;
use crate::matrix::{LocalFactors, SupernodePartition};
use crate::parallel::Phase;
use crate::solver::engine::Sweep;
use crate::solver::workspace::BlockVec;
use crate::utils::SolveStats;
use crate::utils::stats::timed;
use faer::reborrow::*;
use faer::{MatMut, MatRef};

/// Local U blocks by local block column, as `(lib, position in urow(lib))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UColumnIndex {
    cols: Vec<Vec<(usize, usize)>>,
}

impl UColumnIndex {
    pub(crate) fn build(grid: &ProcessGrid, nsupers: usize, factors: &LocalFactors) -> Self {
        let mut cols = vec![Vec::new(); grid.num_local_cols(nsupers)];
        for (lib, row) in factors.urows.iter().enumerate() {
            let Some(row) = row else { continue };
            for (pos, b) in row.blocks.iter().enumerate() {
                cols[grid.lbj(b.col_block)].push((lib, pos));
            }
        }
        UColumnIndex { cols }
    }

    pub(crate) fn column(&self, ljb: usize) -> &[(usize, usize)] {
        self.cols.get(ljb).map_or(&[], Vec::as_slice)
    }
}

pub(crate) struct USweep<'a, K: DenseKernels> {
    grid: ProcessGrid,
    partition: &'a SupernodePartition,
    factors: &'a LocalFactors,
    kernels: &'a K,
    use_inverse: bool,
    ucols: UColumnIndex,
}

impl<'a, K: DenseKernels> USweep<'a, K> {
    pub(crate) fn new(
        grid: ProcessGrid,
        partition: &'a SupernodePartition,
        factors: &'a LocalFactors,
        kernels: &'a K,
        use_inverse: bool,
    ) -> Self {
        let ucols = UColumnIndex::build(&grid, partition.nsupers(), factors);
        USweep { grid, partition, factors, kernels, use_inverse, ucols }
    }
}

impl<K: DenseKernels> Sweep for USweep<'_, K> {
    fn phase(&self) -> Phase {
        Phase::Backward
    }

    fn descending(&self) -> bool {
        true
    }

    fn mod_counts(&self) -> Vec<usize> {
        self.factors
            .urows
            .iter()
            .map(|r| r.as_ref().map_or(0, |r| r.blocks.len()))
            .collect()
    }

    fn consumes(&self, ljb: usize) -> bool {
        !self.ucols.column(ljb).is_empty()
    }

    fn solve_diag(&self, k: usize, mut x: MatMut<'_, f64>, stats: &mut SolveStats) -> Result<(), GsError> {
        let ljb = self.grid.lbj(k);
        let nrhs = x.ncols();
        timed(&mut stats.trsm_time, || -> Result<(), GsError> {
            match self.factors.uinv(ljb).filter(|_| self.use_inverse) {
                Some(uinv) => {
                    let rhs = x.rb().to_owned();
                    self.kernels.gemm(x.rb_mut(), uinv.as_ref(), rhs.as_ref());
                }
                None => {
                    let lu = self
                        .factors
                        .diag_block(ljb)
                        .ok_or_else(|| GsError::Structure(format!("diagonal block of {k} missing")))?;
                    self.kernels.trsm_upper(lu.as_ref(), x.rb_mut());
                }
            }
            Ok(())
        })?;
        stats.ops += SolveStats::upper_solve_ops(self.partition.size(k), nrhs);
        Ok(())
    }

    fn fold(
        &self,
        ljb: usize,
        xk: MatRef<'_, f64>,
        lsum: &mut BlockVec,
        touched: &mut Vec<usize>,
        stats: &mut SolveStats,
    ) -> Result<(), GsError> {
        for &(lib, pos) in self.ucols.column(ljb) {
            let block = self
                .factors
                .urow(lib)
                .and_then(|r| r.blocks.get(pos))
                .ok_or_else(|| GsError::Structure(format!("U column index points past local block row {lib}")))?;
            let target = lsum.expect_mut(lib, "backward block update")?;
            timed(&mut stats.gemm_time, || {
                self.kernels.gemm_sub(target.data.as_mut(), block.values.as_ref(), xk);
            });
            stats.ops += SolveStats::update_ops(block.values.nrows(), block.values.ncols(), xk.ncols());
            touched.push(lib);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::distribute_factors;
    use faer::Mat;

    #[test]
    fn column_index_lists_blocks_by_column() {
        let part = SupernodePartition::from_sizes(&[1, 1, 1, 1]).unwrap();
        let l = Mat::<f64>::identity(4, 4);
        let u = Mat::from_fn(4, 4, |i, j| if i <= j { 1.0 } else { 0.0 });
        // 1 x 2 grid, rank 1 holds block columns 1 and 3
        let grid = ProcessGrid::new(1, 2, 1).unwrap();
        let f = distribute_factors(&grid, &part, l.as_ref(), u.as_ref()).unwrap();
        let idx = UColumnIndex::build(&grid, 4, &f);
        assert_eq!(idx.column(0), &[(0, 0)]);
        assert_eq!(idx.column(1), &[(0, 1), (1, 0), (2, 0)]);
        assert!(idx.column(2).is_empty());
    }
}
