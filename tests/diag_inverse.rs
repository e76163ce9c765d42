//! Diagonal-block inverse precomputation on a process grid.

mod common;

use approx::assert_abs_diff_eq;
use common::random_problem;
use gstrs::parallel::{GridComm, run_grid};
use gstrs::{FaerKernels, GsError, compute_diag_inverses, compute_diag_inverses_on_grid, distribute_factors};

#[test]
fn inverses_exist_exactly_on_diagonal_processes_and_are_computed_once() {
    let problem = random_problem(&[3, 2, 4, 1, 2, 3], 51, false);
    let nsupers = problem.part.nsupers();
    let out = run_grid(2, 3, |comm| {
        let grid = comm.grid();
        let kernels = FaerKernels::default();
        let mut f = distribute_factors(&grid, &problem.part, problem.l.as_ref(), problem.u.as_ref()).unwrap();
        assert!(compute_diag_inverses(&grid, &problem.part, &mut f, &kernels).unwrap());
        let snapshot: Vec<_> = (0..f.num_local_cols()).map(|ljb| (f.linv(ljb).cloned(), f.uinv(ljb).cloned())).collect();
        assert!(!compute_diag_inverses(&grid, &problem.part, &mut f, &kernels).unwrap());

        let mut held = Vec::new();
        for ljb in 0..f.num_local_cols() {
            assert_eq!(f.linv(ljb).cloned(), snapshot[ljb].0);
            assert_eq!(f.uinv(ljb).cloned(), snapshot[ljb].1);
            let k = grid.col_block(ljb);
            if k >= nsupers || !grid.is_diag(k) {
                assert!(f.linv(ljb).is_none());
                continue;
            }
            held.push(k);
            let linv = f.linv(ljb).unwrap();
            let uinv = f.uinv(ljb).unwrap();
            let rows = problem.part.rows(k);
            let lkk = problem.l.as_ref().subrows(rows.start, rows.len()).subcols(rows.start, rows.len());
            let ukk = problem.u.as_ref().subrows(rows.start, rows.len()).subcols(rows.start, rows.len());
            let li = linv.as_ref() * lkk;
            let ui = uinv.as_ref() * ukk;
            for i in 0..rows.len() {
                for j in 0..rows.len() {
                    let id = if i == j { 1.0 } else { 0.0 };
                    assert_abs_diff_eq!(li[(i, j)], id, epsilon = 1e-12);
                    assert_abs_diff_eq!(ui[(i, j)], id, epsilon = 1e-12);
                }
            }
        }
        held
    })
    .unwrap();

    let mut all: Vec<usize> = out.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, (0..nsupers).collect::<Vec<_>>());
}

#[test]
fn zero_pivot_is_reported_with_its_global_row() {
    let mut problem = random_problem(&[2, 3], 52, false);
    problem.u[(3, 3)] = 0.0;
    let out = run_grid(1, 2, |comm| {
        let grid = comm.grid();
        let mut f = distribute_factors(&grid, &problem.part, problem.l.as_ref(), problem.u.as_ref()).unwrap();
        compute_diag_inverses(&grid, &problem.part, &mut f, &FaerKernels::default()).map_err(|e| match e {
            GsError::ZeroPivot(row) => row,
            other => panic!("unexpected {other}"),
        })
    })
    .unwrap();
    assert_eq!(out[0], Ok(true));
    assert_eq!(out[1], Err(3));
}

#[test]
fn grid_wide_inversion_agrees_on_the_first_zero_pivot() {
    let mut problem = random_problem(&[2, 3, 1, 2], 53, false);
    // zero pivots in supernode 2 (row 5, rank 0) and supernode 1 (row 3, rank 1)
    problem.u[(5, 5)] = 0.0;
    problem.u[(3, 3)] = 0.0;
    let out = run_grid(1, 2, |comm| {
        let grid = comm.grid();
        let mut f = distribute_factors(&grid, &problem.part, problem.l.as_ref(), problem.u.as_ref()).unwrap();
        let res = compute_diag_inverses_on_grid(&comm, &problem.part, &mut f, &FaerKernels::default());
        (res.map_err(|e| e.info()), f.has_inverses(), f.linv(0).is_some())
    })
    .unwrap();
    assert_eq!(out, vec![(Err(4), false, false), (Err(4), false, false)]);
}
