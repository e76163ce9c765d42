//! Options for the distributed triangular solve.
//!
//! This module provides the `SolveOptions` struct, which selects whether
//! diagonal blocks are inverted up front, which tree shape the broadcast and
//! reduction trees use, how many threads the dense block kernels may use, and
//! which diagnostics are logged. Every option can be overridden from the
//! environment via [`SolveOptions::from_env`].

use crate::parallel::tree::TreeShape;
use bitflags::bitflags;
use faer::Par;

bitflags! {
    /// Diagnostic output categories, logged through the `log` facade.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Trace: u8 {
        /// Setup counts: leaves, roots, expected messages.
        const SETUP = 1 << 0;
        /// Phase timings (rank 0 only).
        const TIMING = 1 << 1;
        /// One line per message sent or received.
        const MESSAGES = 1 << 2;
    }
}

/// Solve-phase parameters.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Replace diagonal triangular solves by multiplication with precomputed inverses.
    pub diag_inverse: bool,

    /// Topology of the per-block broadcast and reduction trees.
    pub tree_shape: TreeShape,

    /// Threads for a single dense block kernel (1 = sequential).
    pub kernel_threads: usize,

    /// Diagnostics to emit.
    pub trace: Trace,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            diag_inverse: true,
            tree_shape: TreeShape::Binary,
            kernel_threads: 1,
            trace: Trace::empty(),
        }
    }
}

impl SolveOptions {
    /// Defaults overlaid with `GSTRS_DIAG_INV`, `GSTRS_TREE`,
    /// `GSTRS_KERNEL_THREADS` and `GSTRS_TRACE`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut opts = SolveOptions::default();
        opts.apply_overrides(|key| std::env::var(key).ok());
        opts
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GSTRS_DIAG_INV") {
            match v.trim() {
                "0" | "false" | "no" => self.diag_inverse = false,
                "1" | "true" | "yes" => self.diag_inverse = true,
                other => log::warn!(target: "gstrs", "ignoring GSTRS_DIAG_INV={other}"),
            }
        }
        if let Some(v) = lookup("GSTRS_TREE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "flat" => self.tree_shape = TreeShape::Flat,
                "binary" => self.tree_shape = TreeShape::Binary,
                other => log::warn!(target: "gstrs", "ignoring GSTRS_TREE={other}"),
            }
        }
        if let Some(v) = lookup("GSTRS_KERNEL_THREADS") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.kernel_threads = n,
                _ => log::warn!(target: "gstrs", "ignoring GSTRS_KERNEL_THREADS={v}"),
            }
        }
        if let Some(v) = lookup("GSTRS_TRACE") {
            let mut trace = Trace::empty();
            for name in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match Trace::from_name(&name.to_ascii_uppercase()) {
                    Some(flag) => trace |= flag,
                    None => log::warn!(target: "gstrs", "unknown trace category {name}"),
                }
            }
            self.trace = trace;
        }
    }

    /// Parallelism handed to the dense kernels.
    pub fn par(&self) -> Par {
        if self.kernel_threads <= 1 {
            Par::Seq
        } else {
            Par::rayon(self.kernel_threads)
        }
    }
}
