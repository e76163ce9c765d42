//! Shared generators for the integration tests.
//!
//! Problems are random block-sparse factors with a known solution: L is unit
//! lower triangular with a random subset of off-diagonal blocks (and of rows
//! inside them), U is upper triangular with a dominant diagonal, and B is
//! built from a random X so that the expected result is known exactly.

#![allow(dead_code)]

use faer::linalg::triangular_solve::{solve_unit_lower_triangular_in_place, solve_upper_triangular_in_place};
use faer::{Mat, Par};
use gstrs::parallel::{GridComm, LocalComm, run_grid};
use gstrs::{
    CommPattern, Permutations, SolveContext, SolveOptions, SolveStats, SupernodePartition, distribute_factors, gstrs,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub struct Problem {
    pub part: SupernodePartition,
    pub l: Mat<f64>,
    pub u: Mat<f64>,
    pub perms: Permutations,
}

impl Problem {
    pub fn n(&self) -> usize {
        self.part.n()
    }

    /// B such that the solve returns `x` (row `i` of the result is row `i` of `x`).
    pub fn rhs_for(&self, x: &Mat<f64>) -> Mat<f64> {
        let pb = &self.l * &self.u * x;
        let n = self.n();
        Mat::from_fn(n, x.ncols(), |g, j| pb[(self.perms.target_row(g), j)])
    }
}

pub fn random_problem(sizes: &[usize], seed: u64, permute: bool) -> Problem {
    let mut rng = StdRng::seed_from_u64(seed);
    let part = SupernodePartition::from_sizes(sizes).unwrap();
    let n = part.n();
    let nsupers = part.nsupers();
    let scale = 1.0 / (n as f64).sqrt();

    let mut l = Mat::<f64>::identity(n, n);
    let mut u = Mat::<f64>::zeros(n, n);
    for k in 0..nsupers {
        let cols = part.rows(k);
        // diagonal block: dense unit-lower and upper parts
        for i in cols.clone() {
            for j in cols.clone() {
                if i > j {
                    l[(i, j)] = rng.gen_range(-0.5..0.5) * scale;
                } else if i < j {
                    u[(i, j)] = rng.gen_range(-0.5..0.5);
                } else {
                    u[(i, j)] = 2.0 + rng.r#gen::<f64>() + sizes[k] as f64;
                }
            }
        }
        for ik in k + 1..nsupers {
            if rng.gen_bool(0.5) {
                let rows: Vec<usize> = part.rows(ik).filter(|_| rng.gen_bool(0.7)).collect();
                let rows = if rows.is_empty() { vec![part.first_row(ik)] } else { rows };
                for r in rows {
                    for c in cols.clone() {
                        l[(r, c)] = rng.gen_range(-0.5..0.5) * scale;
                    }
                }
            }
            if rng.gen_bool(0.5) {
                for r in cols.clone() {
                    for c in part.rows(ik) {
                        u[(r, c)] = rng.gen_range(-0.5..0.5) * scale;
                    }
                }
            }
        }
    }

    let perms = if permute {
        let mut perm_r: Vec<usize> = (0..n).collect();
        let mut perm_c: Vec<usize> = (0..n).collect();
        perm_r.shuffle(&mut rng);
        perm_c.shuffle(&mut rng);
        Permutations::new(perm_r, perm_c).unwrap()
    } else {
        Permutations::identity(n)
    };
    Problem { part, l, u, perms }
}

pub fn random_solution(n: usize, nrhs: usize, seed: u64) -> Mat<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Mat::from_fn(n, nrhs, |_, _| rng.gen_range(-1.0..1.0))
}

/// Block row distribution of `n` rows over `nprocs` ranks: `(m_loc, fst_row)`.
pub fn split_rows(n: usize, nprocs: usize, rank: usize) -> (usize, usize) {
    let base = n / nprocs;
    let extra = n % nprocs;
    let m_loc = base + usize::from(rank < extra);
    let fst_row = rank * base + rank.min(extra);
    (m_loc, fst_row)
}

/// Column-major local slice of a global B with leading dimension `ldb`.
pub fn local_rows(b: &Mat<f64>, fst_row: usize, m_loc: usize, ldb: usize) -> Vec<f64> {
    let mut out = vec![0.0; ldb * b.ncols()];
    for j in 0..b.ncols() {
        for i in 0..m_loc {
            out[i + j * ldb] = b[(fst_row + i, j)];
        }
    }
    out
}

pub struct RankOutcome {
    pub rank: usize,
    pub m_loc: usize,
    pub fst_row: usize,
    pub ldb: usize,
    /// Status and local B of every solve, in order.
    pub solves: Vec<(i32, Vec<f64>)>,
    pub stats: SolveStats,
    pub has_inverses: bool,
}

/// Solve `problem` on an `nprow x npcol` grid `repeat` times with the same B.
pub fn run_solve(
    problem: &Problem,
    b: &Mat<f64>,
    nprow: usize,
    npcol: usize,
    options: &SolveOptions,
    repeat: usize,
) -> Vec<RankOutcome> {
    run_solve_over(problem, b, nprow, npcol, options, repeat, |comm| comm)
}

/// Like [`run_solve`], every rank talking through `wrap(comm)`.
pub fn run_solve_over<W, F>(
    problem: &Problem,
    b: &Mat<f64>,
    nprow: usize,
    npcol: usize,
    options: &SolveOptions,
    repeat: usize,
    wrap: F,
) -> Vec<RankOutcome>
where
    W: GridComm,
    F: Fn(LocalComm) -> W + Sync,
{
    let n = problem.n();
    let nrhs = b.ncols();
    run_grid(nprow, npcol, |comm| {
        let comm = wrap(comm);
        let grid = comm.grid();
        let rank = comm.rank();
        let (m_loc, fst_row) = split_rows(n, comm.size(), rank);
        let ldb = m_loc + 2;
        let factors = distribute_factors(&grid, &problem.part, problem.l.as_ref(), problem.u.as_ref()).unwrap();
        let pattern = CommPattern::compute(&comm, &problem.part, &problem.perms, m_loc, fst_row).unwrap();
        let mut ctx = SolveContext::new(
            grid,
            problem.part.clone(),
            factors,
            problem.perms.clone(),
            pattern,
            options.clone(),
        )
        .unwrap();
        let mut stats = SolveStats::default();
        let solves = (0..repeat)
            .map(|_| {
                let mut local = local_rows(b, fst_row, m_loc, ldb);
                let info = gstrs(n, &mut ctx, &comm, &mut local, m_loc, fst_row, ldb, nrhs, &mut stats);
                (info, local)
            })
            .collect();
        RankOutcome { rank, m_loc, fst_row, ldb, solves, stats, has_inverses: ctx.factors().has_inverses() }
    })
    .unwrap()
}

/// Global `n x nrhs` result of solve number `which`.
pub fn assemble(outcomes: &[RankOutcome], n: usize, nrhs: usize, which: usize) -> Mat<f64> {
    let mut x = Mat::<f64>::zeros(n, nrhs);
    for o in outcomes {
        let (_, local) = &o.solves[which];
        for j in 0..nrhs {
            for i in 0..o.m_loc {
                x[(o.fst_row + i, j)] = local[i + j * o.ldb];
            }
        }
    }
    x
}

/// Sequential reference: X = U^{-1} L^{-1} (Pc Pr B).
pub fn sequential_reference(problem: &Problem, b: &Mat<f64>) -> Mat<f64> {
    let n = problem.n();
    let mut x = Mat::<f64>::zeros(n, b.ncols());
    for g in 0..n {
        for j in 0..b.ncols() {
            x[(problem.perms.target_row(g), j)] = b[(g, j)];
        }
    }
    solve_unit_lower_triangular_in_place(problem.l.as_ref(), x.as_mut(), Par::Seq);
    solve_upper_triangular_in_place(problem.u.as_ref(), x.as_mut(), Par::Seq);
    x
}

pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    let mut m: f64 = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            m = m.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    m
}
