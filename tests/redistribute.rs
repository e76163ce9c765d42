//! B -> X -> B round trips with no solve in between.

mod common;

use common::{local_rows, random_problem, random_solution, split_rows};
use gstrs::parallel::{GridComm, run_grid};
use gstrs::{BlockVec, CommPattern, RhsBlock, b_to_x, x_to_b};

fn round_trip(nprow: usize, npcol: usize, nrhs: usize) {
    let problem = random_problem(&[2, 3, 1, 2, 2, 1], 41, true);
    let n = problem.n();
    let b = random_solution(n, nrhs, 42);

    run_grid(nprow, npcol, |comm| {
        let grid = comm.grid();
        let (m_loc, fst_row) = split_rows(n, comm.size(), comm.rank());
        let ldb = m_loc + 1;
        let pattern = CommPattern::compute(&comm, &problem.part, &problem.perms, m_loc, fst_row).unwrap();
        let mut values = local_rows(&b, fst_row, m_loc, ldb);
        let mut x = BlockVec::diagonal(&grid, &problem.part, nrhs);

        let rhs = RhsBlock { values: &mut values, m_loc, fst_row, ldb, nrhs };
        b_to_x(&comm, &problem.part, &problem.perms, &pattern, &rhs, &mut x).unwrap();

        // X holds Pc Pr B on the diagonal processes
        for blk in x.iter() {
            for i in 0..blk.data.nrows() {
                let row = problem.part.first_row(blk.supernode) + i;
                let src = (0..n).find(|&g| problem.perms.target_row(g) == row).unwrap();
                for j in 0..nrhs {
                    assert_eq!(blk.data[(i, j)], b[(src, j)]);
                }
            }
        }

        let mut back = vec![f64::NAN; ldb * nrhs];
        let mut out = RhsBlock { values: &mut back, m_loc, fst_row, ldb, nrhs };
        x_to_b(&comm, &problem.part, &pattern, &x, &mut out).unwrap();
        for l in 0..m_loc {
            let g = fst_row + l;
            let src = (0..n).find(|&s| problem.perms.target_row(s) == g).unwrap();
            for j in 0..nrhs {
                assert_eq!(back[l + j * ldb], b[(src, j)]);
            }
        }
    })
    .unwrap();
}

#[test]
fn round_trip_single_rhs() {
    round_trip(2, 2, 1);
    round_trip(1, 3, 1);
}

#[test]
fn round_trip_four_rhs() {
    round_trip(2, 3, 4);
    round_trip(3, 1, 4);
}

#[test]
fn ranks_without_rows_take_part() {
    // 11 rows over 12 ranks: the last rank holds no rows of B
    round_trip(3, 4, 2);
}
