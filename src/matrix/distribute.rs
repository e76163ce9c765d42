//! Build one process's `LocalFactors` from globally known dense factors.
//!
//! This is the layout step a factorization would normally perform while
//! distributing its result. It is used by the tests, the demo and the bench
//! to obtain realistic block-sparse inputs: every block that contains a
//! nonzero is kept, and L blocks keep only their nonzero rows.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::matrix::block::{LBlock, LBlockColumn, LocalFactors, UBlock, UBlockRow};
use crate::matrix::SupernodePartition;
use faer::{Mat, MatRef};

/// Extract the blocks owned by `grid.iam()` from dense `l` (unit lower; its
/// diagonal is ignored) and `u` (upper).
pub fn distribute_factors(
    grid: &ProcessGrid,
    partition: &SupernodePartition,
    l: MatRef<'_, f64>,
    u: MatRef<'_, f64>,
) -> Result<LocalFactors, GsError> {
    let n = partition.n();
    if l.nrows() != n || l.ncols() != n || u.nrows() != n || u.ncols() != n {
        return Err(GsError::Structure(format!("dense factors must be {n} x {n}")));
    }
    let nsupers = partition.nsupers();

    let mut lcols = Vec::new();
    for k in (0..nsupers).filter(|&k| grid.owns_col(k)) {
        let cols = partition.rows(k);
        let ksz = partition.size(k);
        let f0 = partition.first_row(k);
        let diag = grid.is_diag(k).then(|| {
            Mat::from_fn(ksz, ksz, |i, j| if i > j { l[(f0 + i, f0 + j)] } else { u[(f0 + i, f0 + j)] })
        });
        let mut blocks = Vec::new();
        for ik in (k + 1..nsupers).filter(|&ik| grid.owns_row(ik)) {
            let rows: Vec<usize> = partition
                .rows(ik)
                .filter(|&r| cols.clone().any(|c| l[(r, c)] != 0.0))
                .collect();
            if rows.is_empty() {
                continue;
            }
            let values = Mat::from_fn(rows.len(), ksz, |i, j| l[(rows[i], f0 + j)]);
            blocks.push(LBlock { row_block: ik, rows, values });
        }
        if diag.is_some() || !blocks.is_empty() {
            lcols.push(LBlockColumn { col_block: k, diag, blocks });
        }
    }

    let mut urows = Vec::new();
    for ik in (0..nsupers).filter(|&ik| grid.owns_row(ik)) {
        let r0 = partition.first_row(ik);
        let isz = partition.size(ik);
        let mut blocks = Vec::new();
        for k in (ik + 1..nsupers).filter(|&k| grid.owns_col(k)) {
            let c0 = partition.first_row(k);
            let ksz = partition.size(k);
            let nonzero = partition.rows(ik).any(|r| partition.rows(k).any(|c| u[(r, c)] != 0.0));
            if nonzero {
                blocks.push(UBlock { col_block: k, values: Mat::from_fn(isz, ksz, |i, j| u[(r0 + i, c0 + j)]) });
            }
        }
        if !blocks.is_empty() {
            urows.push(UBlockRow { row_block: ik, blocks });
        }
    }

    LocalFactors::new(grid, partition, lcols, urows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_nonzero_rows_and_blocks() {
        let part = SupernodePartition::from_sizes(&[2, 2]).unwrap();
        let mut l = Mat::<f64>::identity(4, 4);
        l[(3, 0)] = 0.5;
        let mut u = Mat::<f64>::identity(4, 4);
        u[(0, 1)] = 2.0;
        let grid = ProcessGrid::new(1, 1, 0).unwrap();
        let f = distribute_factors(&grid, &part, l.as_ref(), u.as_ref()).unwrap();
        let col0 = f.lcol(0).unwrap();
        assert_eq!(col0.blocks.len(), 1);
        assert_eq!(col0.blocks[0].rows, vec![3]);
        assert_eq!(col0.diag.as_ref().unwrap()[(0, 1)], 2.0);
        // U(0,1) is zero, so no U block row at all
        assert!(f.urow(0).is_none());
    }

    #[test]
    fn splits_across_a_grid() {
        let part = SupernodePartition::from_sizes(&[1, 1, 1]).unwrap();
        let l = Mat::from_fn(3, 3, |i, j| if i > j { 0.25 } else if i == j { 1.0 } else { 0.0 });
        let u = Mat::from_fn(3, 3, |i, j| if i <= j { 1.0 } else { 0.0 });
        // 2x1 grid: rank 1 owns block rows 1 only, every block column
        let grid = ProcessGrid::new(2, 1, 1).unwrap();
        let f = distribute_factors(&grid, &part, l.as_ref(), u.as_ref()).unwrap();
        assert!(f.diag_block(0).is_none());
        assert!(f.diag_block(1).is_some());
        assert_eq!(f.lcol(0).unwrap().blocks[0].row_block, 1);
        assert_eq!(f.urow(0).unwrap().blocks[0].col_block, 2);
    }
}
