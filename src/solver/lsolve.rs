//! Forward sweep: solve `L y = b` in place in X.

use crate::core::{DenseKernels, ProcessGrid};
use crate::error::GsError;
use crate::matrix::{LocalFactors, SupernodePartition};
use crate::parallel::Phase;
use crate::solver::engine::Sweep;
use crate::solver::workspace::BlockVec;
use crate::utils::SolveStats;
use crate::utils::stats::timed;
use faer::reborrow::*;
use faer::{Mat, MatMut, MatRef};

pub(crate) struct LSweep<'a, K: DenseKernels> {
    pub(crate) grid: ProcessGrid,
    pub(crate) partition: &'a SupernodePartition,
    pub(crate) factors: &'a LocalFactors,
    pub(crate) kernels: &'a K,
    pub(crate) use_inverse: bool,
}

impl<K: DenseKernels> Sweep for LSweep<'_, K> {
    fn phase(&self) -> Phase {
        Phase::Forward
    }

    fn descending(&self) -> bool {
        false
    }

    fn mod_counts(&self) -> Vec<usize> {
        let mut fmod = vec![0; self.grid.num_local_rows(self.partition.nsupers())];
        for col in self.factors.lcols.iter().flatten() {
            for b in &col.blocks {
                fmod[self.grid.lbi(b.row_block)] += 1;
            }
        }
        fmod
    }

    fn consumes(&self, ljb: usize) -> bool {
        self.factors.lcol(ljb).is_some_and(|c| !c.blocks.is_empty())
    }

    fn solve_diag(&self, k: usize, mut x: MatMut<'_, f64>, stats: &mut SolveStats) -> Result<(), GsError> {
        let ljb = self.grid.lbj(k);
        let ksz = self.partition.size(k);
        let nrhs = x.ncols();
        timed(&mut stats.trsm_time, || -> Result<(), GsError> {
            match self.factors.linv(ljb).filter(|_| self.use_inverse) {
                Some(linv) => {
                    let rhs = x.rb().to_owned();
                    self.kernels.gemm(x.rb_mut(), linv.as_ref(), rhs.as_ref());
                }
                None => {
                    let lu = self
                        .factors
                        .diag_block(ljb)
                        .ok_or_else(|| GsError::Structure(format!("diagonal block of {k} missing")))?;
                    self.kernels.trsm_unit_lower(lu.as_ref(), x.rb_mut());
                }
            }
            Ok(())
        })?;
        stats.ops += SolveStats::lower_solve_ops(ksz, nrhs);
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
        let Some(col) = self.factors.lcol(ljb) else {
            return Ok(());
        };
        let nrhs = xk.ncols();
        for b in &col.blocks {
            let lib = self.grid.lbi(b.row_block);
            let f0 = self.partition.first_row(b.row_block);
            let target = lsum.expect_mut(lib, "forward block update")?;
            timed(&mut stats.gemm_time, || {
                let mut prod = Mat::<f64>::zeros(b.rows.len(), nrhs);
                self.kernels.gemm(prod.as_mut(), b.values.as_ref(), xk);
                for (i, &r) in b.rows.iter().enumerate() {
                    for j in 0..nrhs {
                        target.data[(r - f0, j)] -= prod[(i, j)];
                    }
                }
            });
            stats.ops += SolveStats::update_ops(b.rows.len(), xk.nrows(), nrhs);
            touched.push(lib);
        }
        Ok(())
    }
}
