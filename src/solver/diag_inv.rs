//! Inverses of the diagonal blocks of L and U.
//!
//! Every diagonal process inverts the unit-lower and upper triangles of each
//! LU diagonal block it stores, once per factorization. The sweeps then
//! replace each diagonal triangular solve by a matrix multiply. Blocks are
//! independent, so with the `rayon` feature they are inverted in parallel.

use crate::core::{DenseKernels, ProcessGrid};
use crate::error::GsError;
use crate::matrix::{LocalFactors, SupernodePartition};
use crate::parallel::{GridComm, Scope};
use faer::Mat;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

type Inverses = (usize, Mat<f64>, Mat<f64>);

fn invert_one<K: DenseKernels>(
    grid: &ProcessGrid,
    partition: &SupernodePartition,
    factors: &LocalFactors,
    kernels: &K,
    ljb: usize,
) -> Result<Inverses, GsError> {
    let k = grid.col_block(ljb);
    let lu = factors
        .diag_block(ljb)
        .ok_or_else(|| GsError::Structure(format!("diagonal block of {k} missing")))?;
    if let Some(i) = (0..lu.nrows()).find(|&i| lu[(i, i)] == 0.0) {
        return Err(GsError::ZeroPivot(partition.first_row(k) + i));
    }
    Ok((ljb, kernels.inv_unit_lower(lu.as_ref()), kernels.inv_upper(lu.as_ref())))
}

/// Compute Linv and Uinv for every diagonal block held here.
///
/// Returns `Ok(false)` without recomputing when the inverses already exist.
pub fn compute_diag_inverses<K: DenseKernels + Sync>(
    grid: &ProcessGrid,
    partition: &SupernodePartition,
    factors: &mut LocalFactors,
    kernels: &K,
) -> Result<bool, GsError> {
    if factors.inv_computed {
        return Ok(false);
    }
    let nsupers = partition.nsupers();
    let diag_cols: Vec<usize> = (0..factors.num_local_cols())
        .filter(|&ljb| {
            let k = grid.col_block(ljb);
            k < nsupers && grid.is_diag(k)
        })
        .collect();

    let shared: &LocalFactors = factors;
    #[cfg(feature = "rayon")]
    let results: Vec<Result<Inverses, GsError>> = diag_cols
        .par_iter()
        .map(|&ljb| invert_one(grid, partition, shared, kernels, ljb))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let results: Vec<Result<Inverses, GsError>> = diag_cols
        .iter()
        .map(|&ljb| invert_one(grid, partition, shared, kernels, ljb))
        .collect();

    // in block order, so the first error is the one of the smallest supernode
    let inverses = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    for (ljb, linv, uinv) in inverses {
        factors.linv[ljb] = Some(linv);
        factors.uinv[ljb] = Some(uinv);
    }
    factors.inv_computed = true;
    log::debug!(target: "gstrs", "[{}] inverted {} diagonal blocks", grid.iam(), diag_cols.len());
    Ok(true)
}

/// [`compute_diag_inverses`] on every rank, with one agreed outcome.
/// Collective.
///
/// A zero pivot on any rank makes every rank return `ZeroPivot` with the
/// smallest failing row. On any failure all ranks drop their inverses, so
/// the next call starts from the same state everywhere.
pub fn compute_diag_inverses_on_grid<C: GridComm + ?Sized, K: DenseKernels + Sync>(
    comm: &C,
    partition: &SupernodePartition,
    factors: &mut LocalFactors,
    kernels: &K,
) -> Result<bool, GsError> {
    let grid = comm.grid();
    let nprocs = grid.nprocs();
    let local = compute_diag_inverses(&grid, partition, factors, kernels);

    // slot p: failing row + 1 on rank p; slot nprocs + p: rank p failed otherwise
    let mut flags = vec![0usize; 2 * nprocs];
    match &local {
        Ok(_) => {}
        Err(GsError::ZeroPivot(row)) => flags[grid.iam()] = row + 1,
        Err(_) => flags[nprocs + grid.iam()] = 1,
    }
    comm.all_reduce_sum(Scope::World, &mut flags)?;

    let first_pivot = flags[..nprocs].iter().copied().filter(|&r| r > 0).min();
    let other_failure = flags[nprocs..].iter().position(|&f| f > 0);
    if first_pivot.is_none() && other_failure.is_none() {
        return local;
    }
    factors.clear_inverses();
    if let Some(r) = first_pivot {
        return Err(GsError::ZeroPivot(r - 1));
    }
    match (local, other_failure) {
        (Err(e), _) => Err(e),
        (Ok(_), Some(p)) => Err(GsError::Structure(format!("rank {p} could not invert its diagonal blocks"))),
        (Ok(done), None) => Ok(done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FaerKernels;
    use crate::matrix::distribute_factors;
    use approx::assert_abs_diff_eq;

    fn factors(pivot: f64) -> (ProcessGrid, SupernodePartition, LocalFactors) {
        let part = SupernodePartition::from_sizes(&[3, 2]).unwrap();
        let l = Mat::from_fn(5, 5, |i, j| if i == j { 1.0 } else if i > j { 0.1 * (i + j) as f64 } else { 0.0 });
        let u = Mat::from_fn(5, 5, |i, j| if i == j { if i == 3 { pivot } else { 2.0 + i as f64 } } else if i < j { 0.3 } else { 0.0 });
        let grid = ProcessGrid::new(1, 1, 0).unwrap();
        let f = distribute_factors(&grid, &part, l.as_ref(), u.as_ref()).unwrap();
        (grid, part, f)
    }

    #[test]
    fn inverses_invert_and_are_computed_once() {
        let (grid, part, mut f) = factors(4.0);
        let k = FaerKernels::default();
        assert!(compute_diag_inverses(&grid, &part, &mut f, &k).unwrap());
        let before = f.linv(0).cloned();
        assert!(!compute_diag_inverses(&grid, &part, &mut f, &k).unwrap());
        assert_eq!(f.linv(0).cloned(), before);

        let lu = f.diag_block(0).unwrap();
        let linv = f.linv(0).unwrap();
        let uinv = f.uinv(0).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let mut l_prod = 0.0;
                let mut u_prod = 0.0;
                for p in 0..3 {
                    let l_pj = if p == j { 1.0 } else if p > j { lu[(p, j)] } else { 0.0 };
                    let u_pj = if p <= j { lu[(p, j)] } else { 0.0 };
                    l_prod += linv[(i, p)] * l_pj;
                    u_prod += uinv[(i, p)] * u_pj;
                }
                let id = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(l_prod, id, epsilon = 1e-12);
                assert_abs_diff_eq!(u_prod, id, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn zero_pivot_reports_global_row() {
        let (grid, part, mut f) = factors(0.0);
        let err = compute_diag_inverses(&grid, &part, &mut f, &FaerKernels::default()).unwrap_err();
        assert!(matches!(err, GsError::ZeroPivot(3)));
        assert!(!f.has_inverses());
    }
}
