//! Dense kernel interface used by the solve engines.

use faer::{Mat, MatMut, MatRef};

/// Dense block kernels the triangular sweeps are built on.
///
/// Matrices are column-major `f64` blocks. `lu` arguments are the stored
/// diagonal block of a supernode, holding unit-lower `L` strictly below the
/// diagonal and `U` on and above it.
pub trait DenseKernels {
    /// x ← L⁻¹ x, using the strictly lower part of `lu` with an implicit unit diagonal.
    fn trsm_unit_lower(&self, lu: MatRef<'_, f64>, x: MatMut<'_, f64>);

    /// x ← U⁻¹ x, using the upper part of `lu` (diagonal included).
    fn trsm_upper(&self, lu: MatRef<'_, f64>, x: MatMut<'_, f64>);

    /// dst ← a · b
    fn gemm(&self, dst: MatMut<'_, f64>, a: MatRef<'_, f64>, b: MatRef<'_, f64>);

    /// dst ← dst − a · b
    fn gemm_sub(&self, dst: MatMut<'_, f64>, a: MatRef<'_, f64>, b: MatRef<'_, f64>);

    /// Inverse of a unit lower triangular matrix (only the strictly lower part of `l` is read).
    fn inv_unit_lower(&self, l: MatRef<'_, f64>) -> Mat<f64>;

    /// Inverse of an upper triangular matrix (only the upper part of `u` is read).
    fn inv_upper(&self, u: MatRef<'_, f64>) -> Mat<f64>;
}
