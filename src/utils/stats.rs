//! Operation counts and phase timings of a triangular solve.

use std::time::Instant;

/// Statistics of one solve call, reset at its start.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolveStats {
    /// Floating-point operations of the diagonal solves and block updates.
    pub ops: f64,
    /// Seconds spent waiting in point-to-point receives.
    pub comm_time: f64,
    /// Seconds in diagonal triangular solves (or inverse multiplies).
    pub trsm_time: f64,
    /// Seconds in off-diagonal block updates.
    pub gemm_time: f64,
    pub forward_time: f64,
    pub backward_time: f64,
    /// Seconds in the B -> X and X -> B exchanges together.
    pub redistribute_time: f64,
    pub total_time: f64,
    pub messages_sent: usize,
    pub messages_received: usize,
    /// `f64` words sent point-to-point, message headers included.
    pub message_volume: usize,
}

impl SolveStats {
    pub fn reset(&mut self) {
        *self = SolveStats::default();
    }

    /// Operations of one diagonal solve in the forward sweep.
    pub(crate) fn lower_solve_ops(ksz: usize, nrhs: usize) -> f64 {
        (ksz * ksz.saturating_sub(1) * nrhs) as f64
    }

    /// Operations of one diagonal solve in the backward sweep.
    pub(crate) fn upper_solve_ops(ksz: usize, nrhs: usize) -> f64 {
        (ksz * (ksz + 1) * nrhs) as f64
    }

    /// Operations of an `m x k` block update against `nrhs` columns.
    pub(crate) fn update_ops(m: usize, k: usize, nrhs: usize) -> f64 {
        (2 * m * k * nrhs) as f64
    }
}

/// Run `f`, adding its wall time in seconds to `acc`.
pub(crate) fn timed<T>(acc: &mut f64, f: impl FnOnce() -> T) -> T {
    let t0 = Instant::now();
    let out = f();
    *acc += t0.elapsed().as_secs_f64();
    out
}
