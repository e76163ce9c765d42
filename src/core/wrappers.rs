//! faer implementations of the dense kernels.
//!
//! `FaerKernels` routes every block operation of the sweeps to faer's
//! triangular solve, triangular inverse and matrix multiply. The parallelism
//! handed to faer only affects a single block operation; correctness of the
//! distributed solve never depends on it.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)

use crate::core::traits::DenseKernels;
use faer::linalg::matmul::matmul;
use faer::linalg::triangular_inverse::{invert_unit_lower_triangular, invert_upper_triangular};
use faer::linalg::triangular_solve::{
    solve_unit_lower_triangular_in_place, solve_upper_triangular_in_place,
};
use faer::{Accum, Mat, MatMut, MatRef, Par};

/// Dense kernels backed by faer.
#[derive(Debug, Clone, Copy)]
pub struct FaerKernels {
    pub par: Par,
}

impl FaerKernels {
    pub fn new(par: Par) -> Self {
        FaerKernels { par }
    }
}

impl Default for FaerKernels {
    fn default() -> Self {
        Self::new(Par::Seq)
    }
}

impl DenseKernels for FaerKernels {
    fn trsm_unit_lower(&self, lu: MatRef<'_, f64>, x: MatMut<'_, f64>) {
        assert_eq!(lu.nrows(), x.nrows(), "diagonal block and rhs block disagree");
        solve_unit_lower_triangular_in_place(lu, x, self.par);
    }

    fn trsm_upper(&self, lu: MatRef<'_, f64>, x: MatMut<'_, f64>) {
        assert_eq!(lu.nrows(), x.nrows(), "diagonal block and rhs block disagree");
        solve_upper_triangular_in_place(lu, x, self.par);
    }

    fn gemm(&self, dst: MatMut<'_, f64>, a: MatRef<'_, f64>, b: MatRef<'_, f64>) {
        matmul(dst, Accum::Replace, a, b, 1.0, self.par);
    }

    fn gemm_sub(&self, dst: MatMut<'_, f64>, a: MatRef<'_, f64>, b: MatRef<'_, f64>) {
        matmul(dst, Accum::Add, a, b, -1.0, self.par);
    }

    fn inv_unit_lower(&self, l: MatRef<'_, f64>) -> Mat<f64> {
        let n = l.nrows();
        // only the strictly lower part of the destination is written
        let mut inv = Mat::<f64>::identity(n, n);
        invert_unit_lower_triangular(inv.as_mut(), l, self.par);
        inv
    }

    fn inv_upper(&self, u: MatRef<'_, f64>) -> Mat<f64> {
        let n = u.nrows();
        let mut inv = Mat::<f64>::zeros(n, n);
        invert_upper_triangular(inv.as_mut(), u, self.par);
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn lu_block() -> Mat<f64> {
        // L = [[1,0,0],[0.5,1,0],[-0.25,0.75,1]], U = [[4,1,-2],[0,3,0.5],[0,0,2]]
        Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 4.0, (0, 1) => 1.0, (0, 2) => -2.0,
            (1, 0) => 0.5, (1, 1) => 3.0, (1, 2) => 0.5,
            (2, 0) => -0.25, (2, 1) => 0.75, (2, 2) => 2.0,
            _ => 0.0,
        })
    }

    #[test]
    fn inverse_multiply_matches_trsm() {
        let k = FaerKernels::default();
        let lu = lu_block();
        let rhs = Mat::from_fn(3, 2, |i, j| (i + 2 * j) as f64 - 1.5);

        let mut by_trsm = rhs.clone();
        k.trsm_unit_lower(lu.as_ref(), by_trsm.as_mut());
        let linv = k.inv_unit_lower(lu.as_ref());
        let mut by_inv = Mat::<f64>::zeros(3, 2);
        k.gemm(by_inv.as_mut(), linv.as_ref(), rhs.as_ref());
        for i in 0..3 {
            for j in 0..2 {
                assert_abs_diff_eq!(by_trsm[(i, j)], by_inv[(i, j)], epsilon = 1e-12);
            }
        }

        let mut by_trsm = rhs.clone();
        k.trsm_upper(lu.as_ref(), by_trsm.as_mut());
        let uinv = k.inv_upper(lu.as_ref());
        k.gemm(by_inv.as_mut(), uinv.as_ref(), rhs.as_ref());
        for i in 0..3 {
            for j in 0..2 {
                assert_abs_diff_eq!(by_trsm[(i, j)], by_inv[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn gemm_sub_accumulates() {
        let k = FaerKernels::default();
        let a = Mat::from_fn(2, 2, |i, j| (i * 2 + j) as f64);
        let b = Mat::<f64>::identity(2, 2);
        let mut dst = Mat::from_fn(2, 2, |_, _| 10.0);
        k.gemm_sub(dst.as_mut(), a.as_ref(), b.as_ref());
        assert_eq!(dst[(0, 0)], 10.0);
        assert_eq!(dst[(1, 1)], 7.0);
    }
}
