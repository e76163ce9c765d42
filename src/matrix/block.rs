//! Block-sparse storage of the distributed L and U factors.
//!
//! Each process stores the L factor by block column and the U factor by block
//! row, for the supernodes its grid position owns. The diagonal LU block of a
//! supernode lives in the L block column on the diagonal process. Blocks are
//! tagged with the global supernode they belong to; the structures are
//! read-only once built.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::matrix::SupernodePartition;
use faer::Mat;

/// Off-diagonal block `L(row_block, k)` of an L block column.
#[derive(Debug, Clone)]
pub struct LBlock {
    /// Global supernode of the block row.
    pub row_block: usize,
    /// Global row indices (ascending) of the stored rows, all inside `row_block`.
    pub rows: Vec<usize>,
    /// `rows.len() x size(k)` values.
    pub values: Mat<f64>,
}

/// Block column `k` of L as held by one process.
#[derive(Debug, Clone)]
pub struct LBlockColumn {
    pub col_block: usize,
    /// Combined LU diagonal block, present only on the diagonal process.
    pub diag: Option<Mat<f64>>,
    /// Off-diagonal blocks below the diagonal, in rows owned by this process.
    pub blocks: Vec<LBlock>,
}

/// Block `U(ik, col_block)` of a U block row, stored dense.
#[derive(Debug, Clone)]
pub struct UBlock {
    pub col_block: usize,
    /// `size(ik) x size(col_block)` values.
    pub values: Mat<f64>,
}

/// Block row `ik` of U as held by one process (diagonal excluded).
#[derive(Debug, Clone)]
pub struct UBlockRow {
    pub row_block: usize,
    pub blocks: Vec<UBlock>,
}

/// The solve-relevant part of the distributed factors on one process.
#[derive(Debug, Clone)]
pub struct LocalFactors {
    pub(crate) lcols: Vec<Option<LBlockColumn>>,
    pub(crate) urows: Vec<Option<UBlockRow>>,
    pub(crate) linv: Vec<Option<Mat<f64>>>,
    pub(crate) uinv: Vec<Option<Mat<f64>>>,
    pub(crate) inv_computed: bool,
}

impl LocalFactors {
    /// Place and validate the blocks this process owns.
    pub fn new(
        grid: &ProcessGrid,
        partition: &SupernodePartition,
        lcols: Vec<LBlockColumn>,
        urows: Vec<UBlockRow>,
    ) -> Result<Self, GsError> {
        let nsupers = partition.nsupers();
        let nlc = grid.num_local_cols(nsupers);
        let nlr = grid.num_local_rows(nsupers);
        let mut lslots: Vec<Option<LBlockColumn>> = vec![None; nlc];
        let mut uslots: Vec<Option<UBlockRow>> = vec![None; nlr];

        for col in lcols {
            let k = col.col_block;
            if k >= nsupers || !grid.owns_col(k) {
                return Err(GsError::Structure(format!("L block column {k} not owned by rank {}", grid.iam())));
            }
            let ksz = partition.size(k);
            match (&col.diag, grid.is_diag(k)) {
                (Some(d), true) if d.nrows() == ksz && d.ncols() == ksz => {}
                (None, false) => {}
                (Some(_), true) => return Err(GsError::Structure(format!("diagonal block of {k} is not {ksz} x {ksz}"))),
                (Some(_), false) => return Err(GsError::Structure(format!("diagonal block of {k} stored off the diagonal process"))),
                (None, true) => return Err(GsError::Structure(format!("diagonal block of {k} missing"))),
            }
            for b in &col.blocks {
                let ik = b.row_block;
                if ik <= k || ik >= nsupers || !grid.owns_row(ik) {
                    return Err(GsError::Structure(format!("L({ik},{k}) misplaced on rank {}", grid.iam())));
                }
                let rows = partition.rows(ik);
                let sorted = b.rows.windows(2).all(|w| w[0] < w[1]);
                if b.rows.is_empty() || !sorted || b.rows.iter().any(|r| !rows.contains(r)) {
                    return Err(GsError::Structure(format!("L({ik},{k}) row indices invalid")));
                }
                if b.values.nrows() != b.rows.len() || b.values.ncols() != ksz {
                    return Err(GsError::Structure(format!("L({ik},{k}) has wrong shape")));
                }
            }
            let slot = &mut lslots[grid.lbj(k)];
            if slot.is_some() {
                return Err(GsError::Structure(format!("L block column {k} given twice")));
            }
            *slot = Some(col);
        }

        for row in urows {
            let ik = row.row_block;
            if ik >= nsupers || !grid.owns_row(ik) {
                return Err(GsError::Structure(format!("U block row {ik} not owned by rank {}", grid.iam())));
            }
            for b in &row.blocks {
                let k = b.col_block;
                if k <= ik || k >= nsupers || !grid.owns_col(k) {
                    return Err(GsError::Structure(format!("U({ik},{k}) misplaced on rank {}", grid.iam())));
                }
                if b.values.nrows() != partition.size(ik) || b.values.ncols() != partition.size(k) {
                    return Err(GsError::Structure(format!("U({ik},{k}) has wrong shape")));
                }
            }
            let slot = &mut uslots[grid.lbi(ik)];
            if slot.is_some() {
                return Err(GsError::Structure(format!("U block row {ik} given twice")));
            }
            *slot = Some(row);
        }

        for k in (0..nsupers).filter(|&k| grid.is_diag(k)) {
            if lslots[grid.lbj(k)].is_none() {
                return Err(GsError::Structure(format!("diagonal block of {k} missing")));
            }
        }

        Ok(LocalFactors {
            lcols: lslots,
            urows: uslots,
            linv: vec![None; nlc],
            uinv: vec![None; nlc],
            inv_computed: false,
        })
    }

    /// L block column at local column index `ljb`.
    pub fn lcol(&self, ljb: usize) -> Option<&LBlockColumn> {
        self.lcols.get(ljb).and_then(Option::as_ref)
    }

    /// U block row at local row index `lib`.
    pub fn urow(&self, lib: usize) -> Option<&UBlockRow> {
        self.urows.get(lib).and_then(Option::as_ref)
    }

    /// Stored LU diagonal block at local column index `ljb`.
    pub fn diag_block(&self, ljb: usize) -> Option<&Mat<f64>> {
        self.lcol(ljb).and_then(|c| c.diag.as_ref())
    }

    pub fn linv(&self, ljb: usize) -> Option<&Mat<f64>> {
        self.linv.get(ljb).and_then(Option::as_ref)
    }

    pub fn uinv(&self, ljb: usize) -> Option<&Mat<f64>> {
        self.uinv.get(ljb).and_then(Option::as_ref)
    }

    /// Whether the diagonal inverses have been computed.
    pub fn has_inverses(&self) -> bool {
        self.inv_computed
    }

    pub(crate) fn clear_inverses(&mut self) {
        self.linv.iter_mut().for_each(|m| *m = None);
        self.uinv.iter_mut().for_each(|m| *m = None);
        self.inv_computed = false;
    }

    pub fn num_local_cols(&self) -> usize {
        self.lcols.len()
    }

    pub fn num_local_rows(&self) -> usize {
        self.urows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| if i == j { 2.0 } else { 0.0 })
    }

    #[test]
    fn single_process_layout() {
        let grid = ProcessGrid::new(1, 1, 0).unwrap();
        let part = SupernodePartition::from_sizes(&[2, 1]).unwrap();
        let lcols = vec![
            LBlockColumn {
                col_block: 0,
                diag: Some(diag(2)),
                blocks: vec![LBlock { row_block: 1, rows: vec![2], values: Mat::from_fn(1, 2, |_, _| 0.5) }],
            },
            LBlockColumn { col_block: 1, diag: Some(diag(1)), blocks: vec![] },
        ];
        let urows = vec![UBlockRow {
            row_block: 0,
            blocks: vec![UBlock { col_block: 1, values: Mat::from_fn(2, 1, |_, _| 1.0) }],
        }];
        let f = LocalFactors::new(&grid, &part, lcols, urows).unwrap();
        assert_eq!(f.lcol(0).unwrap().blocks.len(), 1);
        assert!(f.urow(1).is_none());
        assert!(!f.has_inverses());
    }

    #[test]
    fn missing_diagonal_is_rejected() {
        let grid = ProcessGrid::new(1, 1, 0).unwrap();
        let part = SupernodePartition::from_sizes(&[2, 1]).unwrap();
        let lcols = vec![LBlockColumn { col_block: 0, diag: Some(diag(2)), blocks: vec![] }];
        let err = LocalFactors::new(&grid, &part, lcols, vec![]).unwrap_err();
        assert!(matches!(err, GsError::Structure(_)));
    }

    #[test]
    fn misplaced_block_is_rejected() {
        let grid = ProcessGrid::new(2, 1, 0).unwrap();
        let part = SupernodePartition::from_sizes(&[1, 1]).unwrap();
        // row block 1 belongs to process row 1
        let lcols = vec![LBlockColumn {
            col_block: 0,
            diag: Some(diag(1)),
            blocks: vec![LBlock { row_block: 1, rows: vec![1], values: Mat::from_fn(1, 1, |_, _| 1.0) }],
        }];
        assert!(LocalFactors::new(&grid, &part, lcols, vec![]).is_err());
    }
}
