use faer::Mat;
use gstrs::parallel::{GridComm, UniverseComm, run_grid};
use gstrs::{CommPattern, Permutations, SolveContext, SolveOptions, SolveStats, SupernodePartition, distribute_factors};
use rand::Rng;

fn main() {
    let (nprow, npcol) = (2, 2);
    let part = SupernodePartition::from_sizes(&[3, 2, 4, 1, 3, 2]).unwrap();
    let n = part.n();

    // L unit lower with a few sub-diagonal blocks, U upper with a strong diagonal
    let mut rng = rand::thread_rng();
    let mut l = Mat::<f64>::identity(n, n);
    let mut u = Mat::<f64>::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            let (bi, bj) = (part.block_of(i), part.block_of(j));
            if i > j && (bi == bj || (bi + bj) % 3 == 0) {
                l[(i, j)] = 0.2 * (rng.r#gen::<f64>() - 0.5);
            } else if i < j && (bi == bj || (bi + bj) % 2 == 1) {
                u[(i, j)] = 0.2 * (rng.r#gen::<f64>() - 0.5);
            } else if i == j {
                u[(i, j)] = 4.0 + rng.r#gen::<f64>();
            }
        }
    }
    let x_true = Mat::from_fn(n, 1, |i, _| (i + 1) as f64);
    let b = &l * &u * &x_true;

    let options = SolveOptions::from_env();
    let results = run_grid(nprow, npcol, |comm| {
        // the same code runs over MPI with UniverseComm::Mpi
        let comm = UniverseComm::Local(comm);
        let grid = comm.grid();
        let nprocs = comm.size();
        let m_loc = n / nprocs + usize::from(comm.rank() < n % nprocs);
        let fst_row = comm.rank() * (n / nprocs) + comm.rank().min(n % nprocs);

        let factors = distribute_factors(&grid, &part, l.as_ref(), u.as_ref()).unwrap();
        let perms = Permutations::identity(n);
        let pattern = CommPattern::compute(&comm, &part, &perms, m_loc, fst_row).unwrap();
        let mut ctx = SolveContext::new(grid, part.clone(), factors, perms, pattern, options.clone()).unwrap();

        let mut local: Vec<f64> = (0..m_loc).map(|i| b[(fst_row + i, 0)]).collect();
        let mut stats = SolveStats::default();
        ctx.solve(&comm, &mut local, m_loc, fst_row, m_loc, 1, &mut stats).unwrap();
        (fst_row, local, stats)
    })
    .unwrap();

    let mut err: f64 = 0.0;
    for (rank, (fst_row, local, stats)) in results.iter().enumerate() {
        for (i, v) in local.iter().enumerate() {
            err = err.max((v - x_true[(fst_row + i, 0)]).abs());
        }
        println!(
            "rank {rank}: {} rows, {} messages sent, {:.0} flops, {:.3e}s",
            local.len(),
            stats.messages_sent,
            stats.ops,
            stats.total_time
        );
    }
    println!("max |x - x_true| = {err:.3e}");
}
