//! 2D process grid and block-cyclic ownership.
//!
//! Ranks are laid out row-major: rank `r * npcol + c` sits at grid position
//! `(r, c)`. Supernode `k` is owned row-wise by process row `k mod nprow` and
//! column-wise by process column `k mod npcol`; the process at the
//! intersection is the diagonal process of `k`. On its owners, `k` is stored
//! at local block row `k / nprow` and local block column `k / npcol`.

use crate::error::GsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    nprow: usize,
    npcol: usize,
    iam: usize,
}

impl ProcessGrid {
    pub fn new(nprow: usize, npcol: usize, iam: usize) -> Result<Self, GsError> {
        if nprow == 0 || npcol == 0 {
            return Err(GsError::InvalidGrid(format!("{nprow} x {npcol} grid is empty")));
        }
        if iam >= nprow * npcol {
            return Err(GsError::InvalidGrid(format!(
                "rank {iam} outside a {nprow} x {npcol} grid"
            )));
        }
        Ok(ProcessGrid { nprow, npcol, iam })
    }

    pub fn nprow(&self) -> usize { self.nprow }
    pub fn npcol(&self) -> usize { self.npcol }
    pub fn nprocs(&self) -> usize { self.nprow * self.npcol }
    pub fn iam(&self) -> usize { self.iam }
    pub fn myrow(&self) -> usize { self.iam / self.npcol }
    pub fn mycol(&self) -> usize { self.iam % self.npcol }

    /// Process row owning block row `k`.
    pub fn prow(&self, k: usize) -> usize { k % self.nprow }
    /// Process column owning block column `k`.
    pub fn pcol(&self, k: usize) -> usize { k % self.npcol }
    /// Rank of grid position `(row, col)`.
    pub fn pnum(&self, row: usize, col: usize) -> usize { row * self.npcol + col }
    /// Rank holding the diagonal block of supernode `k`.
    pub fn diag_proc(&self, k: usize) -> usize { self.pnum(self.prow(k), self.pcol(k)) }

    /// Local block-row index of `k` on its owning process row.
    pub fn lbi(&self, k: usize) -> usize { k / self.nprow }
    /// Local block-column index of `k` on its owning process column.
    pub fn lbj(&self, k: usize) -> usize { k / self.npcol }
    /// Global block of local block row `lib` on this process.
    pub fn row_block(&self, lib: usize) -> usize { self.myrow() + lib * self.nprow }
    /// Global block of local block column `ljb` on this process.
    pub fn col_block(&self, ljb: usize) -> usize { self.mycol() + ljb * self.npcol }

    pub fn owns_row(&self, k: usize) -> bool { self.prow(k) == self.myrow() }
    pub fn owns_col(&self, k: usize) -> bool { self.pcol(k) == self.mycol() }
    pub fn is_diag(&self, k: usize) -> bool { self.owns_row(k) && self.owns_col(k) }

    /// Local block rows every process in a row reserves (same on all of them).
    pub fn num_local_rows(&self, nsupers: usize) -> usize { nsupers.div_ceil(self.nprow) }
    /// Local block columns every process in a column reserves.
    pub fn num_local_cols(&self, nsupers: usize) -> usize { nsupers.div_ceil(self.npcol) }

    /// Ranks in this process's grid row, by column.
    pub fn row_members(&self) -> Vec<usize> {
        (0..self.npcol).map(|c| self.pnum(self.myrow(), c)).collect()
    }

    /// Ranks in this process's grid column, by row.
    pub fn col_members(&self) -> Vec<usize> {
        (0..self.nprow).map(|r| self.pnum(r, self.mycol())).collect()
    }

    /// Same grid seen from another rank.
    pub fn with_rank(&self, iam: usize) -> Result<Self, GsError> {
        ProcessGrid::new(self.nprow, self.npcol, iam)
    }
}
