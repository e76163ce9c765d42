//! In-process transport: one thread per rank, std channels between them.
//!
//! Every rank owns two inboxes. Point-to-point messages travel in their wire
//! form (tag plus flat `f64` buffer) exactly as they would over MPI.
//! Collectives use the second inbox and are matched by source rank: all ranks
//! issue the same sequence of collectives and channels are FIFO per sender,
//! so the next collective packet from a given peer always belongs to the
//! collective in progress. Packets from other peers that arrive early are
//! stashed until asked for.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::parallel::{GridComm, Message, Scope, VarCounts};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(20);

struct WirePacket {
    tag: i32,
    buf: Vec<f64>,
}

enum CollData {
    Indices(Vec<usize>),
    Values(Vec<f64>),
    Signal,
}

struct CollPacket {
    src: usize,
    data: CollData,
}

pub struct LocalComm {
    grid: ProcessGrid,
    // None at our own rank: a rank never messages itself
    p2p_out: Vec<Option<Sender<WirePacket>>>,
    p2p_in: Receiver<WirePacket>,
    coll_out: Vec<Option<Sender<CollPacket>>>,
    coll_in: Receiver<CollPacket>,
    stash: RefCell<Vec<VecDeque<CollData>>>,
    aborted: Arc<AtomicBool>,
}

impl LocalComm {
    /// Connected communicators for every rank of an `nprow x npcol` grid,
    /// indexed by rank.
    pub fn universe(nprow: usize, npcol: usize) -> Result<Vec<LocalComm>, GsError> {
        let base = ProcessGrid::new(nprow, npcol, 0)?;
        let nprocs = base.nprocs();
        let (p2p_tx, p2p_rx): (Vec<_>, Vec<_>) = (0..nprocs).map(|_| mpsc::channel()).unzip();
        let (coll_tx, coll_rx): (Vec<_>, Vec<_>) = (0..nprocs).map(|_| mpsc::channel()).unzip();
        let aborted = Arc::new(AtomicBool::new(false));

        let mut comms = Vec::with_capacity(nprocs);
        for (rank, (p2p_in, coll_in)) in p2p_rx.into_iter().zip(coll_rx).enumerate() {
            comms.push(LocalComm {
                grid: base.with_rank(rank)?,
                p2p_out: peers_of(rank, &p2p_tx),
                p2p_in,
                coll_out: peers_of(rank, &coll_tx),
                coll_in,
                stash: RefCell::new((0..nprocs).map(|_| VecDeque::new()).collect()),
                aborted: Arc::clone(&aborted),
            });
        }
        Ok(comms)
    }

    /// Next point-to-point message if one has already arrived.
    pub fn try_recv(&self) -> Result<Option<Message>, GsError> {
        self.check_aborted()?;
        match self.p2p_in.try_recv() {
            Ok(pkt) => Message::decode(pkt.tag, pkt.buf).map(Some),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn check_aborted(&self) -> Result<(), GsError> {
        if self.aborted.load(Ordering::SeqCst) {
            Err(GsError::Comm(format!("rank {}: grid aborted", self.grid.iam())))
        } else {
            Ok(())
        }
    }

    fn coll_send(&self, dest: usize, data: CollData) -> Result<(), GsError> {
        let tx = self.coll_out[dest]
            .as_ref()
            .ok_or_else(|| GsError::Comm("collective packet addressed to self".into()))?;
        tx.send(CollPacket { src: self.grid.iam(), data })
            .map_err(|_| GsError::Comm(format!("rank {dest} left before the collective finished")))
    }

    fn coll_recv(&self, src: usize) -> Result<CollData, GsError> {
        if let Some(data) = self.stash.borrow_mut()[src].pop_front() {
            return Ok(data);
        }
        loop {
            match self.coll_in.recv_timeout(POLL) {
                Ok(pkt) if pkt.src == src => return Ok(pkt.data),
                Ok(pkt) => self.stash.borrow_mut()[pkt.src].push_back(pkt.data),
                Err(RecvTimeoutError::Timeout) => self.check_aborted()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GsError::Comm("every peer left during a collective".into()));
                }
            }
        }
    }

    fn alltoallv<T: Copy>(
        &self,
        send: &[T],
        sendc: VarCounts<'_>,
        recvc: VarCounts<'_>,
        wrap: fn(Vec<T>) -> CollData,
        unwrap: fn(CollData) -> Option<Vec<T>>,
    ) -> Result<Vec<T>, GsError> {
        let nprocs = self.grid.nprocs();
        let me = self.grid.iam();
        if sendc.counts.len() != nprocs || recvc.counts.len() != nprocs {
            return Err(GsError::Comm(format!("all-to-all counts must have {nprocs} entries")));
        }
        if send.len() < sendc.displs[nprocs - 1] + sendc.counts[nprocs - 1] {
            return Err(GsError::Comm("all-to-all send buffer shorter than its counts".into()));
        }
        for p in (0..nprocs).filter(|&p| p != me) {
            self.coll_send(p, wrap(send[sendc.range(p)].to_vec()))?;
        }
        let mut out: Vec<T> = Vec::with_capacity(recvc.total());
        let mut parts: Vec<Option<Vec<T>>> = (0..nprocs).map(|_| None).collect();
        parts[me] = Some(send[sendc.range(me)].to_vec());
        for p in (0..nprocs).filter(|&p| p != me) {
            let part = unwrap(self.coll_recv(p)?)
                .ok_or_else(|| GsError::Protocol(format!("collective mismatch with rank {p}")))?;
            parts[p] = Some(part);
        }
        for (p, part) in parts.into_iter().enumerate() {
            let part = part.unwrap_or_default();
            if part.len() != recvc.counts[p] {
                return Err(GsError::Protocol(format!(
                    "rank {p} sent {} entries, {} expected",
                    part.len(),
                    recvc.counts[p]
                )));
            }
            if out.len() != recvc.displs[p] {
                return Err(GsError::Comm("receive displacements must be packed in rank order".into()));
            }
            out.extend(part);
        }
        Ok(out)
    }
}

fn peers_of<T>(rank: usize, txs: &[Sender<T>]) -> Vec<Option<Sender<T>>> {
    txs.iter().enumerate().map(|(p, tx)| (p != rank).then(|| tx.clone())).collect()
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }
}

impl GridComm for LocalComm {
    fn grid(&self) -> ProcessGrid {
        self.grid
    }

    fn barrier(&self) -> Result<(), GsError> {
        let me = self.grid.iam();
        let others = (0..self.grid.nprocs()).filter(|&p| p != me);
        for p in others.clone() {
            self.coll_send(p, CollData::Signal)?;
        }
        for p in others {
            match self.coll_recv(p)? {
                CollData::Signal => {}
                _ => return Err(GsError::Protocol(format!("rank {p} is not in the barrier"))),
            }
        }
        Ok(())
    }

    fn send(&self, dest: usize, msg: &Message) -> Result<(), GsError> {
        self.check_aborted()?;
        let tx = self
            .p2p_out
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| GsError::Comm(format!("rank {} cannot send to {dest}", self.grid.iam())))?;
        tx.send(WirePacket { tag: msg.tag(), buf: msg.encode() })
            .map_err(|_| GsError::Comm(format!("rank {dest} is gone")))
    }

    fn recv(&self) -> Result<Message, GsError> {
        loop {
            match self.p2p_in.recv_timeout(POLL) {
                Ok(pkt) => return Message::decode(pkt.tag, pkt.buf),
                Err(RecvTimeoutError::Timeout) => self.check_aborted()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GsError::Comm(format!(
                        "rank {} waits for a message but every peer is gone",
                        self.grid.iam()
                    )));
                }
            }
        }
    }

    fn alltoallv_indices(&self, send: &[usize], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<usize>, GsError> {
        self.alltoallv(send, sendc, recvc, CollData::Indices, |d| match d {
            CollData::Indices(v) => Some(v),
            _ => None,
        })
    }

    fn alltoallv_values(&self, send: &[f64], sendc: VarCounts<'_>, recvc: VarCounts<'_>) -> Result<Vec<f64>, GsError> {
        self.alltoallv(send, sendc, recvc, CollData::Values, |d| match d {
            CollData::Values(v) => Some(v),
            _ => None,
        })
    }

    fn all_reduce_sum(&self, scope: Scope, buf: &mut [usize]) -> Result<(), GsError> {
        let me = self.grid.iam();
        let others: Vec<usize> = scope.members(&self.grid).into_iter().filter(|&p| p != me).collect();
        for &p in &others {
            self.coll_send(p, CollData::Indices(buf.to_vec()))?;
        }
        for &p in &others {
            match self.coll_recv(p)? {
                CollData::Indices(v) if v.len() == buf.len() => {
                    buf.iter_mut().zip(v).for_each(|(a, b)| *a += b);
                }
                _ => return Err(GsError::Protocol(format!("all-reduce mismatch with rank {p}"))),
            }
        }
        Ok(())
    }

    fn abort(&self, code: i32) -> ! {
        self.aborted.store(true, Ordering::SeqCst);
        panic!("rank {} aborted the grid with code {code}", self.grid.iam());
    }
}

/// Run `f` on every rank of an `nprow x npcol` grid, one thread each, and
/// collect the results by rank.
pub fn run_grid<F, R>(nprow: usize, npcol: usize, f: F) -> Result<Vec<R>, GsError>
where
    F: Fn(LocalComm) -> R + Sync,
    R: Send,
{
    let comms = LocalComm::universe(nprow, npcol)?;
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.into_iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| h.join().map_err(|_| GsError::Comm(format!("rank {rank} panicked"))))
            .collect()
    })
}
