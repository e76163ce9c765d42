//! Per-sweep tree construction.
//!
//! Which ranks take part in a block column's broadcast or a block row's
//! reduction depends on block structure held by other ranks, so each sweep
//! starts with two scoped sums: one over the process column telling every
//! member which ranks need X(k) of each local block column, and one over the
//! process row telling it which ranks hold contributions to each local block
//! row. The diagonal process of a supernode is always the root of both of
//! its trees.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::parallel::tree::root_first;
use crate::parallel::{BcastTree, GridComm, ReduceTree, Scope, TreeShape};

#[derive(Debug, Clone)]
pub(crate) struct PhaseTrees {
    /// By local block column; `None` where this rank takes no part.
    pub(crate) bcast: Vec<Option<BcastTree>>,
    /// By local block row; `None` where this rank takes no part.
    pub(crate) reduce: Vec<Option<ReduceTree>>,
}

impl PhaseTrees {
    /// `needs_x[ljb]`: this rank holds blocks that consume X of local block
    /// column `ljb`. `contributes[lib]`: this rank folds updates into local
    /// block row `lib`. Collective over the grid.
    pub(crate) fn build<C: GridComm + ?Sized>(
        comm: &C,
        nsupers: usize,
        needs_x: &[bool],
        contributes: &[bool],
        shape: TreeShape,
    ) -> Result<Self, GsError> {
        let grid = comm.grid();
        let (nprow, npcol) = (grid.nprow(), grid.npcol());
        let nlc = grid.num_local_cols(nsupers);
        let nlr = grid.num_local_rows(nsupers);
        if needs_x.len() != nlc || contributes.len() != nlr {
            return Err(GsError::Structure("tree masks do not match the local block counts".into()));
        }

        let col_in = |ljb: usize| {
            let k = grid.col_block(ljb);
            k < nsupers && (grid.is_diag(k) || needs_x[ljb])
        };
        let mut cmask = vec![0usize; nlc * nprow];
        for ljb in (0..nlc).filter(|&ljb| col_in(ljb)) {
            cmask[ljb * nprow + grid.myrow()] = 1;
        }
        comm.all_reduce_sum(Scope::Col, &mut cmask)?;

        let row_in = |lib: usize| {
            let k = grid.row_block(lib);
            k < nsupers && (grid.is_diag(k) || contributes[lib])
        };
        let mut rmask = vec![0usize; nlr * npcol];
        for lib in (0..nlr).filter(|&lib| row_in(lib)) {
            rmask[lib * npcol + grid.mycol()] = 1;
        }
        comm.all_reduce_sum(Scope::Row, &mut rmask)?;

        let mut bcast = Vec::with_capacity(nlc);
        for ljb in 0..nlc {
            let tree = if col_in(ljb) {
                let k = grid.col_block(ljb);
                let members = (0..nprow)
                    .filter(|&r| cmask[ljb * nprow + r] > 0)
                    .map(|r| grid.pnum(r, grid.mycol()))
                    .collect();
                Some(BcastTree::new(&root_first(grid.diag_proc(k), members), grid.iam(), shape)?)
            } else {
                None
            };
            bcast.push(tree);
        }

        let mut reduce = Vec::with_capacity(nlr);
        for lib in 0..nlr {
            let tree = if row_in(lib) {
                let k = grid.row_block(lib);
                let members = (0..npcol)
                    .filter(|&c| rmask[lib * npcol + c] > 0)
                    .map(|c| grid.pnum(grid.myrow(), c))
                    .collect();
                Some(ReduceTree::new(&root_first(grid.diag_proc(k), members), grid.iam(), shape)?)
            } else {
                None
            };
            reduce.push(tree);
        }

        Ok(PhaseTrees { bcast, reduce })
    }

    /// Broadcast messages this rank will receive.
    pub(crate) fn expected_broadcasts(&self) -> usize {
        self.bcast.iter().flatten().filter(|t| t.expects_message()).count()
    }

    /// Partial sums each local block row waits for (0 where inactive).
    pub(crate) fn recv_counts(&self) -> Vec<usize> {
        self.reduce.iter().map(|t| t.as_ref().map_or(0, ReduceTree::recv_count)).collect()
    }

    pub(crate) fn active_rows(&self) -> Vec<bool> {
        self.reduce.iter().map(Option::is_some).collect()
    }
}

/// Log the shape of a sweep's trees for this rank.
pub(crate) fn log_setup(grid: &ProcessGrid, phase: &str, trees: &PhaseTrees, seeds: usize) {
    log::debug!(
        target: "gstrs",
        "[{}] {phase}: {} seeds, {} broadcasts expected, {} partial sums expected, {} active rows",
        grid.iam(),
        seeds,
        trees.expected_broadcasts(),
        trees.recv_counts().iter().sum::<usize>(),
        trees.reduce.iter().flatten().count(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::run_grid;

    #[test]
    fn membership_follows_the_masks() {
        // 2 x 2 grid, 2 supernodes; only rank 2 = (1, 0) needs X(0),
        // only rank 1 = (0, 1) contributes to row 0
        let out = run_grid(2, 2, |comm| {
            let me = comm.rank();
            let needs_x = vec![me == 2];
            let contributes = vec![me == 1];
            let trees = PhaseTrees::build(&comm, 2, &needs_x, &contributes, TreeShape::Binary).unwrap();
            (trees.expected_broadcasts(), trees.recv_counts(), trees.active_rows())
        })
        .unwrap();
        // rank 0 is the root of column 0 and row 0
        assert_eq!(out[0], (0, vec![1], vec![true]));
        assert_eq!(out[1], (0, vec![0], vec![true]));
        // rank 2 receives X(0); rank 3 is the diagonal of supernode 1
        assert_eq!(out[2], (1, vec![0], vec![false]));
        assert_eq!(out[3], (0, vec![0], vec![true]));
    }
}
