//! MPI transport for the grid solve.
//!
//! `MpiGridComm` maps the 2D process grid onto `MPI_COMM_WORLD` (row-major, as
//! the grid layout requires) and splits off one communicator per grid row and
//! per grid column for scoped reductions. Point-to-point traffic uses
//! buffered sends so the self-scheduling loops never block on a send; the
//! attached buffer must hold every message a rank can have in flight.
//!
//! # References
//! - [MPI Standard](https://www.mpi-forum.org/)
//! - [rsmpi](https://docs.rs/mpi)
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")] {
//! use gstrs::parallel::{GridComm, MpiGridComm};
//! let comm = MpiGridComm::new(2, 2, 1 << 24).unwrap();
//! println!("rank {} of {}", comm.rank(), comm.size());
//! comm.barrier().unwrap();
//! # }
//! ```

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::parallel::{GridComm, Message, Scope, VarCounts};
use mpi::Count;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

pub struct MpiGridComm {
    grid: ProcessGrid,
    world: SimpleCommunicator,
    row: SimpleCommunicator,
    col: SimpleCommunicator,
    // dropped last: finalizes MPI
    _universe: Universe,
}

fn counts_of(v: &[usize]) -> Result<Vec<Count>, GsError> {
    v.iter()
        .map(|&c| Count::try_from(c).map_err(|_| GsError::Comm(format!("count {c} exceeds the MPI count range"))))
        .collect()
}

impl MpiGridComm {
    /// Initialize MPI, attach a send buffer of `buffer_bytes` and lay the
    /// world out as an `nprow x npcol` grid.
    pub fn new(nprow: usize, npcol: usize, buffer_bytes: usize) -> Result<Self, GsError> {
        let mut universe = mpi::initialize().ok_or_else(|| GsError::Comm("MPI already initialized".into()))?;
        universe.set_buffer_size(buffer_bytes);
        let world = universe.world();
        let size = world.size() as usize;
        if size != nprow * npcol {
            return Err(GsError::InvalidGrid(format!("{nprow} x {npcol} grid on {size} MPI ranks")));
        }
        let grid = ProcessGrid::new(nprow, npcol, world.rank() as usize)?;
        let split = |color: usize| {
            let color = Count::try_from(color).map_err(|_| GsError::InvalidGrid("grid too large".into()))?;
            world
                .split_by_color(Color::with_value(color))
                .ok_or_else(|| GsError::Comm("communicator split failed".into()))
        };
        let row = split(grid.myrow())?;
        let col = split(grid.mycol())?;
        Ok(MpiGridComm { grid, world, row, col, _universe: universe })
    }

    fn scope_comm(&self, scope: Scope) -> &SimpleCommunicator {
        match scope {
            Scope::World => &self.world,
            Scope::Row => &self.row,
            Scope::Col => &self.col,
        }
    }
}

impl GridComm for MpiGridComm {
    fn grid(&self) -> ProcessGrid {
        self.grid
    }

    fn barrier(&self) -> Result<(), GsError> {
        self.world.barrier();
        Ok(())
    }

    fn send(&self, dest: usize, msg: &Message) -> Result<(), GsError> {
        let buf = msg.encode();
        self.world
            .process_at_rank(dest as i32)
            .buffered_send_with_tag(&buf[..], msg.tag());
        Ok(())
    }

    fn recv(&self) -> Result<Message, GsError> {
        let (buf, status) = self.world.any_process().receive_vec::<f64>();
        Message::decode(status.tag(), buf)
    }

    fn alltoallv_indices(&self, send: &[usize], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<usize>, GsError> {
        let send: Vec<u64> = send.iter().map(|&i| i as u64).collect();
        let mut recv = vec![0u64; recvc.total()];
        let (sc, sd) = (counts_of(sendc.counts)?, counts_of(sendc.displs)?);
        let (rc, rd) = (counts_of(recvc.counts)?, counts_of(recvc.displs)?);
        self.world.all_to_all_varcount_into(
            &Partition::new(&send[..], &sc[..], &sd[..]),
            &mut PartitionMut::new(&mut recv[..], &rc[..], &rd[..]),
        );
        Ok(recv.into_iter().map(|i| i as usize).collect())
    }

    fn alltoallv_values(&self, send: &[f64], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<f64>, GsError> {
        let mut recv = vec![0.0f64; recvc.total()];
        let (sc, sd) = (counts_of(sendc.counts)?, counts_of(sendc.displs)?);
        let (rc, rd) = (counts_of(recvc.counts)?, counts_of(recvc.displs)?);
        self.world.all_to_all_varcount_into(
            &Partition::new(send, &sc[..], &sd[..]),
            &mut PartitionMut::new(&mut recv[..], &rc[..], &rd[..]),
        );
        Ok(recv)
    }

    fn all_reduce_sum(&self, scope: Scope, buf: &mut [usize]) -> Result<(), GsError> {
        let send: Vec<u64> = buf.iter().map(|&v| v as u64).collect();
        let mut recv = vec![0u64; send.len()];
        self.scope_comm(scope)
            .all_reduce_into(&send[..], &mut recv[..], &SystemOperation::sum());
        buf.iter_mut().zip(recv).for_each(|(b, r)| *b = r as usize);
        Ok(())
    }

    fn abort(&self, code: i32) -> ! {
        self.world.abort(code)
    }
}
