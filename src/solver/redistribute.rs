//! Moving the right-hand side between its row distribution and X.
//!
//! B is distributed by rows: each process holds a column-major
//! `m_loc x nrhs` block of consecutive global rows starting at `fst_row`. The
//! sweeps need row `perm_c[perm_r[i]]` of B inside the X block of the
//! supernode covering it, on that supernode's diagonal process. Both
//! directions are one all-to-all of row indices and one all-to-all of values
//! with each row's `nrhs` entries kept together. The counts come from a
//! [`CommPattern`] computed once per factorization.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::matrix::SupernodePartition;
use crate::parallel::{GridComm, Scope, VarCounts, displacements};
use crate::solver::workspace::BlockVec;

/// Row and column permutations applied to B before the solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutations {
    pub perm_r: Vec<usize>,
    pub perm_c: Vec<usize>,
}

fn is_permutation(p: &[usize]) -> bool {
    let mut seen = vec![false; p.len()];
    p.iter().all(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true))
}

impl Permutations {
    pub fn new(perm_r: Vec<usize>, perm_c: Vec<usize>) -> Result<Self, GsError> {
        if perm_r.len() != perm_c.len() || !is_permutation(&perm_r) || !is_permutation(&perm_c) {
            return Err(GsError::invalid(3, "perm_r and perm_c must be permutations of the same order"));
        }
        Ok(Permutations { perm_r, perm_c })
    }

    pub fn identity(n: usize) -> Self {
        Permutations { perm_r: (0..n).collect(), perm_c: (0..n).collect() }
    }

    pub fn n(&self) -> usize {
        self.perm_r.len()
    }

    /// Row of `Pc Pr B` that global row `row` of B becomes.
    pub fn target_row(&self, row: usize) -> usize {
        self.perm_c[self.perm_r[row]]
    }
}

/// Counts and displacements of one all-to-all, in rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub send_counts: Vec<usize>,
    pub send_displs: Vec<usize>,
    pub recv_counts: Vec<usize>,
    pub recv_displs: Vec<usize>,
}

impl Exchange {
    fn from_counts<C: GridComm + ?Sized>(comm: &C, send_counts: Vec<usize>) -> Result<Self, GsError> {
        let nprocs = comm.size();
        let ones = vec![1; nprocs];
        let displs = displacements(&ones);
        let recv_counts = comm.alltoallv_indices(
            &send_counts,
            VarCounts { counts: &ones, displs: &displs },
            VarCounts { counts: &ones, displs: &displs },
        )?;
        Ok(Exchange {
            send_displs: displacements(&send_counts),
            recv_displs: displacements(&recv_counts),
            send_counts,
            recv_counts,
        })
    }

    pub fn total_send(&self) -> usize {
        self.send_counts.iter().sum()
    }

    pub fn total_recv(&self) -> usize {
        self.recv_counts.iter().sum()
    }

    fn scaled(v: &[usize], nrhs: usize) -> Vec<usize> {
        v.iter().map(|&c| c * nrhs).collect()
    }
}

/// Communication pattern of the B <-> X exchanges for one row distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommPattern {
    pub b_to_x: Exchange,
    pub x_to_b: Exchange,
    /// Rank holding each global row of B.
    pub row_to_proc: Vec<usize>,
    pub m_loc: usize,
    pub fst_row: usize,
}

impl CommPattern {
    /// Collective: every rank passes its own `m_loc` and `fst_row`; together
    /// they must cover `0..n` exactly once.
    pub fn compute<C: GridComm + ?Sized>(
        comm: &C,
        partition: &SupernodePartition,
        perms: &Permutations,
        m_loc: usize,
        fst_row: usize,
    ) -> Result<Self, GsError> {
        let grid = comm.grid();
        let n = partition.n();
        if perms.n() != n {
            return Err(GsError::invalid(3, format!("permutations of order {} for n = {n}", perms.n())));
        }
        if fst_row.checked_add(m_loc).is_none_or(|end| end > n) {
            return Err(GsError::invalid(7, format!("rows {fst_row}..{fst_row}+{m_loc} exceed n = {n}")));
        }

        // owner + 1 in the first half, number of owners in the second
        let mut owners = vec![0usize; 2 * n];
        for row in fst_row..fst_row + m_loc {
            owners[row] = grid.iam() + 1;
            owners[n + row] = 1;
        }
        comm.all_reduce_sum(Scope::World, &mut owners)?;
        if let Some(row) = (0..n).find(|&r| owners[n + r] != 1) {
            return Err(GsError::invalid(7, format!("global row {row} of B is held by {} ranks", owners[n + row])));
        }
        let row_to_proc: Vec<usize> = owners[..n].iter().map(|&p| p - 1).collect();

        let mut b_send = vec![0usize; grid.nprocs()];
        for row in fst_row..fst_row + m_loc {
            b_send[grid.diag_proc(partition.block_of(perms.target_row(row)))] += 1;
        }
        let mut x_send = vec![0usize; grid.nprocs()];
        for k in (0..partition.nsupers()).filter(|&k| grid.is_diag(k)) {
            for row in partition.rows(k) {
                x_send[row_to_proc[row]] += 1;
            }
        }

        Ok(CommPattern {
            b_to_x: Exchange::from_counts(comm, b_send)?,
            x_to_b: Exchange::from_counts(comm, x_send)?,
            row_to_proc,
            m_loc,
            fst_row,
        })
    }
}

fn try_buffer<T: Clone + Default>(len: usize, what: &str) -> Result<Vec<T>, GsError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| GsError::Allocation(format!("{what} of {len} entries: {e}")))?;
    v.resize(len, T::default());
    Ok(v)
}

/// Send buffers filled in per-destination order.
struct Packer {
    idx: Vec<usize>,
    vals: Vec<f64>,
    next: Vec<usize>,
    nrhs: usize,
}

impl Packer {
    fn new(ex: &Exchange, nrhs: usize) -> Result<Self, GsError> {
        let total = ex.total_send();
        Ok(Packer {
            idx: try_buffer(total, "index send buffer")?,
            vals: try_buffer(total * nrhs, "value send buffer")?,
            next: ex.send_displs.clone(),
            nrhs,
        })
    }

    fn push(&mut self, dest: usize, row: usize, values: impl Iterator<Item = f64>) -> Result<(), GsError> {
        let slot = self.next[dest];
        if slot >= self.idx.len() {
            return Err(GsError::invalid(10, "communication pattern does not match the data being sent"));
        }
        self.idx[slot] = row;
        for (j, v) in values.take(self.nrhs).enumerate() {
            self.vals[slot * self.nrhs + j] = v;
        }
        self.next[dest] += 1;
        Ok(())
    }

    /// Exchange both buffers; returns received rows and their values.
    fn exchange<C: GridComm + ?Sized>(self, comm: &C, ex: &Exchange) -> Result<(Vec<usize>, Vec<f64>), GsError> {
        let filled = self.next.iter().zip(ex.send_displs.iter().zip(&ex.send_counts)).all(|(&n, (&d, &c))| n == d + c);
        if !filled {
            return Err(GsError::invalid(10, "communication pattern does not match the data being sent"));
        }
        let rows = comm.alltoallv_indices(
            &self.idx,
            VarCounts { counts: &ex.send_counts, displs: &ex.send_displs },
            VarCounts { counts: &ex.recv_counts, displs: &ex.recv_displs },
        )?;
        let (sc, sd) = (Exchange::scaled(&ex.send_counts, self.nrhs), Exchange::scaled(&ex.send_displs, self.nrhs));
        let (rc, rd) = (Exchange::scaled(&ex.recv_counts, self.nrhs), Exchange::scaled(&ex.recv_displs, self.nrhs));
        let vals = comm.alltoallv_values(
            &self.vals,
            VarCounts { counts: &sc, displs: &sd },
            VarCounts { counts: &rc, displs: &rd },
        )?;
        if rows.len() != ex.total_recv() || vals.len() != ex.total_recv() * self.nrhs {
            return Err(GsError::Protocol(format!(
                "received {} rows and {} values, the pattern promises {} rows",
                rows.len(),
                vals.len(),
                ex.total_recv()
            )));
        }
        Ok((rows, vals))
    }
}

/// Local slice of B as handed to the solve.
pub struct RhsBlock<'a> {
    pub values: &'a mut [f64],
    pub m_loc: usize,
    pub fst_row: usize,
    pub ldb: usize,
    pub nrhs: usize,
}

/// Scatter B into X on the diagonal processes. Collective.
pub fn b_to_x<C: GridComm + ?Sized>(
    comm: &C,
    partition: &SupernodePartition,
    perms: &Permutations,
    pattern: &CommPattern,
    b: &RhsBlock<'_>,
    x: &mut BlockVec,
) -> Result<(), GsError> {
    let grid = comm.grid();
    let ex = &pattern.b_to_x;
    let mut packer = Packer::new(ex, b.nrhs)?;
    for l in 0..b.m_loc {
        let irow = perms.target_row(b.fst_row + l);
        let dest = grid.diag_proc(partition.block_of(irow));
        packer.push(dest, irow, (0..b.nrhs).map(|j| b.values[l + j * b.ldb]))?;
    }
    let (rows, vals) = packer.exchange(comm, ex)?;
    unpack_into_x(&grid, partition, &rows, &vals, b.nrhs, x)
}

fn unpack_into_x(
    grid: &ProcessGrid,
    partition: &SupernodePartition,
    rows: &[usize],
    vals: &[f64],
    nrhs: usize,
    x: &mut BlockVec,
) -> Result<(), GsError> {
    for (i, &irow) in rows.iter().enumerate() {
        if irow >= partition.n() {
            return Err(GsError::Protocol(format!("received row {irow} outside the matrix")));
        }
        let k = partition.block_of(irow);
        let blk = x.expect_mut(grid.lbi(k), "B -> X")?;
        let off = irow - partition.first_row(k);
        for j in 0..nrhs {
            blk.data[(off, j)] = vals[i * nrhs + j];
        }
    }
    Ok(())
}

/// Gather X from the diagonal processes back into B. Collective.
pub fn x_to_b<C: GridComm + ?Sized>(
    comm: &C,
    partition: &SupernodePartition,
    pattern: &CommPattern,
    x: &BlockVec,
    b: &mut RhsBlock<'_>,
) -> Result<(), GsError> {
    let ex = &pattern.x_to_b;
    let mut packer = Packer::new(ex, b.nrhs)?;
    for blk in x.iter() {
        let f0 = partition.first_row(blk.supernode);
        for i in 0..blk.data.nrows() {
            let row = f0 + i;
            packer.push(pattern.row_to_proc[row], row, (0..b.nrhs).map(|j| blk.data[(i, j)]))?;
        }
    }
    let (rows, vals) = packer.exchange(comm, ex)?;
    for (i, &row) in rows.iter().enumerate() {
        let l = row
            .checked_sub(b.fst_row)
            .filter(|&l| l < b.m_loc)
            .ok_or_else(|| GsError::Protocol(format!("received row {row} of B held elsewhere")))?;
        for j in 0..b.nrhs {
            b.values[l + j * b.ldb] = vals[i * b.nrhs + j];
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::run_grid;

    #[test]
    fn permutation_checks() {
        assert!(Permutations::new(vec![1, 0, 2], vec![2, 1, 0]).is_ok());
        assert!(Permutations::new(vec![1, 1, 2], vec![0, 1, 2]).is_err());
        let p = Permutations::new(vec![1, 2, 0], vec![2, 0, 1]).unwrap();
        assert_eq!(p.target_row(0), 0);
        assert_eq!(p.target_row(1), 1);
    }

    #[test]
    fn pattern_counts_on_a_1x2_grid() {
        // 3 supernodes of size 1: diagonals on ranks 0, 1, 0
        let part = SupernodePartition::from_sizes(&[1, 1, 1]).unwrap();
        let perms = Permutations::identity(3);
        let out = run_grid(1, 2, |comm| {
            let (m_loc, fst_row) = if comm.rank() == 0 { (2, 0) } else { (1, 2) };
            CommPattern::compute(&comm, &part, &perms, m_loc, fst_row).unwrap()
        })
        .unwrap();
        assert_eq!(out[0].row_to_proc, vec![0, 0, 1]);
        assert_eq!(out[0].b_to_x.send_counts, vec![1, 1]);
        assert_eq!(out[1].b_to_x.send_counts, vec![1, 0]);
        assert_eq!(out[0].b_to_x.recv_counts, vec![1, 1]);
        assert_eq!(out[0].x_to_b.send_counts, vec![1, 1]);
        assert_eq!(out[1].x_to_b.recv_counts, vec![1, 0]);
        assert_eq!(out[0].b_to_x.total_recv(), 2);
        assert_eq!(out[1].x_to_b.total_recv(), 1);
    }

    #[test]
    fn rows_past_the_end_report_the_first_row_argument() {
        let part = SupernodePartition::from_sizes(&[2, 1]).unwrap();
        let perms = Permutations::identity(3);
        let out = run_grid(1, 1, |comm| CommPattern::compute(&comm, &part, &perms, 2, 2).map(|_| ()).map_err(|e| e.info()))
            .unwrap();
        assert_eq!(out, vec![Err(-7)]);
    }

    #[test]
    fn overlapping_rows_are_rejected() {
        let part = SupernodePartition::from_sizes(&[2]).unwrap();
        let perms = Permutations::identity(2);
        let out = run_grid(1, 2, |comm| {
            CommPattern::compute(&comm, &part, &perms, 2, 0).map(|_| ()).map_err(|e| e.info())
        })
        .unwrap();
        assert_eq!(out, vec![Err(-7), Err(-7)]);
    }
}
