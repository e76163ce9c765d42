//! Message passing over a 2D process grid.
//!
//! `GridComm` is everything the solve needs from a transport: blocking
//! point-to-point messages for the self-scheduling loops, two kinds of
//! collectives (variable-count all-to-all over all ranks, element-wise sum over
//! the world, a grid row or a grid column) and a collective abort. Collectives
//! never interleave with point-to-point traffic, so a transport may keep them
//! on separate channels.

use crate::core::ProcessGrid;
use crate::error::GsError;

pub mod local_comm;
pub mod message;
pub mod tree;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiGridComm;

pub use local_comm::{LocalComm, run_grid};
pub use message::{Message, MsgKind, Phase};
pub use tree::{BcastTree, ReduceTree, TreeShape};

/// Group of ranks taking part in a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    World,
    /// The caller's grid row.
    Row,
    /// The caller's grid column.
    Col,
}

impl Scope {
    pub fn members(&self, grid: &ProcessGrid) -> Vec<usize> {
        match self {
            Scope::World => (0..grid.nprocs()).collect(),
            Scope::Row => grid.row_members(),
            Scope::Col => grid.col_members(),
        }
    }
}

/// Per-rank element counts and displacements of a variable all-to-all buffer.
#[derive(Debug, Clone, Copy)]
pub struct VarCounts<'a> {
    pub counts: &'a [usize],
    pub displs: &'a [usize],
}

impl VarCounts<'_> {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub(crate) fn range(&self, p: usize) -> std::ops::Range<usize> {
        self.displs[p]..self.displs[p] + self.counts[p]
    }
}

pub trait GridComm {
    fn grid(&self) -> ProcessGrid;
    fn rank(&self) -> usize {
        self.grid().iam()
    }
    fn size(&self) -> usize {
        self.grid().nprocs()
    }
    fn barrier(&self) -> Result<(), GsError>;
    /// Send without waiting for the receiver.
    fn send(&self, dest: usize, msg: &Message) -> Result<(), GsError>;
    /// Block until a message from any rank arrives.
    fn recv(&self) -> Result<Message, GsError>;
    fn alltoallv_indices(&self, send: &[usize], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<usize>, GsError>;
    fn alltoallv_values(&self, send: &[f64], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<f64>, GsError>;
    /// Element-wise sum of `buf` across `scope`; every member ends with the total.
    fn all_reduce_sum(&self, scope: Scope, buf: &mut [usize]) -> Result<(), GsError>;
    /// Terminate every rank of the grid.
    fn abort(&self, code: i32) -> !;
}

/// Any of the available transports.
pub enum UniverseComm {
    Local(LocalComm),
    #[cfg(feature = "mpi")]
    Mpi(MpiGridComm),
}

impl GridComm for UniverseComm {
    fn grid(&self) -> ProcessGrid {
        match self {
            UniverseComm::Local(comm) => comm.grid(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.grid(),
        }
    }
    fn barrier(&self) -> Result<(), GsError> {
        match self {
            UniverseComm::Local(comm) => comm.barrier(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
        }
    }
    fn send(&self, dest: usize, msg: &Message) -> Result<(), GsError> {
        match self {
            UniverseComm::Local(comm) => comm.send(dest, msg),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.send(dest, msg),
        }
    }
    fn recv(&self) -> Result<Message, GsError> {
        match self {
            UniverseComm::Local(comm) => comm.recv(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.recv(),
        }
    }
    fn alltoallv_indices(&self, send: &[usize], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<usize>, GsError> {
        match self {
            UniverseComm::Local(comm) => comm.alltoallv_indices(send, sendc, recvc),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.alltoallv_indices(send, sendc, recvc),
        }
    }
    fn alltoallv_values(&self, send: &[f64], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<f64>, GsError> {
        match self {
            UniverseComm::Local(comm) => comm.alltoallv_values(send, sendc, recvc),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.alltoallv_values(send, sendc, recvc),
        }
    }
    fn all_reduce_sum(&self, scope: Scope, buf: &mut [usize]) -> Result<(), GsError> {
        match self {
            UniverseComm::Local(comm) => comm.all_reduce_sum(scope, buf),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_sum(scope, buf),
        }
    }
    fn abort(&self, code: i32) -> ! {
        match self {
            UniverseComm::Local(comm) => comm.abort(code),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.abort(code),
        }
    }
}

/// Displacements of a packed buffer with the given per-rank counts.
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut acc = 0;
    for &c in counts {
        displs.push(acc);
        acc += c;
    }
    displs
}
