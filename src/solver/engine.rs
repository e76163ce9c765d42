//! Self-scheduling dataflow loop shared by the forward and backward sweeps.
//!
//! Each rank starts by solving the diagonal blocks whose rows need nothing
//! from anyone (leaves forward, roots backward). Solving block `k` broadcasts
//! X(k) down its block column and folds it into every local block row it
//! updates. A row whose modifications and partial sums are all in is either
//! solved here, on its diagonal process, or forwarded as a partial sum to its
//! reduction-tree parent. After that the rank blocks on its inbox until every
//! broadcast and partial sum it expects has arrived. Messages may arrive in
//! any order; the dependency counters alone decide when a row is ready.

use crate::config::{SolveOptions, Trace};
use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::matrix::SupernodePartition;
use crate::parallel::{GridComm, Message, MsgKind, Phase};
use crate::solver::deps::DepTable;
use crate::solver::topology::{PhaseTrees, log_setup};
use crate::solver::workspace::{BlockVec, block_from_payload};
use crate::utils::SolveStats;
use crate::utils::stats::timed;
use faer::{MatMut, MatRef};
use std::collections::VecDeque;

/// What distinguishes the forward sweep from the backward one.
pub(crate) trait Sweep {
    fn phase(&self) -> Phase;

    /// Leaves first: ascending supernodes forward, descending backward.
    fn descending(&self) -> bool;

    /// Local block modifications of every local block row.
    fn mod_counts(&self) -> Vec<usize>;

    /// Whether this rank holds off-diagonal blocks that consume X of local
    /// block column `ljb`.
    fn consumes(&self, ljb: usize) -> bool;

    /// Solve `x` in place with the diagonal block of supernode `k`.
    fn solve_diag(&self, k: usize, x: MatMut<'_, f64>, stats: &mut SolveStats) -> Result<(), GsError>;

    /// Subtract the products of column `ljb`'s blocks with `xk` from lsum,
    /// one entry in `touched` per block folded.
    fn fold(
        &self,
        ljb: usize,
        xk: MatRef<'_, f64>,
        lsum: &mut BlockVec,
        touched: &mut Vec<usize>,
        stats: &mut SolveStats,
    ) -> Result<(), GsError>;
}

fn phase_name(p: Phase) -> &'static str {
    match p {
        Phase::Forward => "forward",
        Phase::Backward => "backward",
    }
}

struct Engine<'a, C: GridComm + ?Sized, S: Sweep> {
    comm: &'a C,
    grid: ProcessGrid,
    partition: &'a SupernodePartition,
    sweep: &'a S,
    trees: PhaseTrees,
    deps: DepTable,
    x: &'a mut BlockVec,
    lsum: BlockVec,
    ready: VecDeque<usize>,
    pending_bcast: usize,
    pending_reduce: usize,
    nrhs: usize,
    trace: Trace,
    stats: &'a mut SolveStats,
}

impl<C: GridComm + ?Sized, S: Sweep> Engine<'_, C, S> {
    fn send(&mut self, dests_sent: usize, msg: &Message) {
        self.stats.messages_sent += dests_sent;
        self.stats.message_volume += dests_sent * msg.wire_len();
        if self.trace.contains(Trace::MESSAGES) && dests_sent > 0 {
            log::trace!(
                target: "gstrs",
                "[{}] sent {:?} {:?} of supernode {} to {} ranks",
                self.grid.iam(), msg.phase, msg.kind, msg.supernode, dests_sent
            );
        }
    }

    /// Solve diagonal block `k`, broadcast X(k) and fold it locally.
    fn solve(&mut self, k: usize) -> Result<(), GsError> {
        let lib = self.grid.lbi(k);
        let ljb = self.grid.lbj(k);
        self.deps.mark_solved(lib)?;
        let xk = self.x.expect_mut(lib, "diagonal solve")?;
        if let Some(part) = self.lsum.get(lib) {
            for j in 0..xk.data.ncols() {
                for i in 0..xk.data.nrows() {
                    xk.data[(i, j)] += part.data[(i, j)];
                }
            }
        }
        self.sweep.solve_diag(k, xk.data.as_mut(), self.stats)?;

        let payload = xk.to_payload();
        let xk_data = xk.data.clone();
        if let Some(tree) = self.trees.bcast[ljb].as_ref() {
            let msg = Message::new(self.sweep.phase(), MsgKind::Broadcast, k, payload);
            let sent = tree.forward(self.comm, &msg)?;
            self.send(sent, &msg);
        }
        self.fold_column(ljb, xk_data.as_ref())
    }

    fn fold_column(&mut self, ljb: usize, xk: MatRef<'_, f64>) -> Result<(), GsError> {
        let mut touched = Vec::new();
        self.sweep.fold(ljb, xk, &mut self.lsum, &mut touched, self.stats)?;
        for lib in touched {
            if self.deps.fold(lib)? {
                self.row_ready(lib)?;
            }
        }
        Ok(())
    }

    /// Local block row `lib` has everything it waits for.
    fn row_ready(&mut self, lib: usize) -> Result<(), GsError> {
        let k = self.grid.row_block(lib);
        if self.grid.is_diag(k) {
            self.ready.push_back(k);
            return Ok(());
        }
        self.deps.mark_solved(lib)?;
        let tree = self.trees.reduce[lib]
            .as_ref()
            .ok_or_else(|| GsError::Protocol(format!("no reduction tree for supernode {k}")))?;
        let part = self.lsum.expect_mut(lib, "partial sum")?;
        let msg = Message::new(self.sweep.phase(), MsgKind::Reduce, k, part.to_payload());
        let sent = tree.forward(self.comm, &msg)?;
        self.send(sent, &msg);
        Ok(())
    }

    fn drain_ready(&mut self) -> Result<(), GsError> {
        while let Some(k) = self.ready.pop_front() {
            self.solve(k)?;
        }
        Ok(())
    }

    fn handle(&mut self, msg: Message) -> Result<(), GsError> {
        self.stats.messages_received += 1;
        if self.trace.contains(Trace::MESSAGES) {
            log::trace!(
                target: "gstrs",
                "[{}] received {:?} {:?} of supernode {}",
                self.grid.iam(), msg.phase, msg.kind, msg.supernode
            );
        }
        let k = msg.supernode;
        if msg.phase != self.sweep.phase() || k >= self.partition.nsupers() {
            return Err(GsError::Protocol(format!(
                "{:?} message for supernode {k} during the {} sweep",
                msg.phase,
                phase_name(self.sweep.phase())
            )));
        }
        match msg.kind {
            MsgKind::Broadcast => {
                let ljb = self.grid.lbj(k);
                let tree = self
                    .trees
                    .bcast
                    .get(ljb)
                    .and_then(Option::as_ref)
                    .filter(|t| self.grid.owns_col(k) && t.expects_message())
                    .ok_or_else(|| GsError::Protocol(format!("unexpected broadcast of supernode {k}")))?;
                self.pending_bcast = self
                    .pending_bcast
                    .checked_sub(1)
                    .ok_or_else(|| GsError::Protocol("more broadcasts than expected".into()))?;
                let sent = tree.forward(self.comm, &msg)?;
                self.send(sent, &msg);
                let xk = block_from_payload(self.partition.size(k), self.nrhs, &msg.payload)?;
                self.fold_column(ljb, xk.as_ref())
            }
            MsgKind::Reduce => {
                if !self.grid.owns_row(k) {
                    return Err(GsError::Protocol(format!("partial sum of supernode {k} sent to the wrong row")));
                }
                let lib = self.grid.lbi(k);
                self.pending_reduce = self
                    .pending_reduce
                    .checked_sub(1)
                    .ok_or_else(|| GsError::Protocol("more partial sums than expected".into()))?;
                let ready = self.deps.receive(lib)?;
                let target = if self.grid.is_diag(k) { &mut *self.x } else { &mut self.lsum };
                target.expect_mut(lib, "partial sum")?.add_payload(&msg.payload)?;
                if ready {
                    self.row_ready(lib)?;
                }
                Ok(())
            }
        }
    }
}

/// Run one sweep over X on this rank. Collective: every rank of the grid
/// must call it with the same phase.
pub(crate) fn run_sweep<C: GridComm + ?Sized, S: Sweep>(
    comm: &C,
    partition: &SupernodePartition,
    sweep: &S,
    x: &mut BlockVec,
    options: &SolveOptions,
    stats: &mut SolveStats,
) -> Result<(), GsError> {
    let grid = comm.grid();
    let nsupers = partition.nsupers();
    let nlc = grid.num_local_cols(nsupers);
    let nrhs = x.nrhs();

    let mods = sweep.mod_counts();
    let needs_x: Vec<bool> = (0..nlc).map(|ljb| sweep.consumes(ljb)).collect();
    let contributes: Vec<bool> = mods.iter().map(|&m| m > 0).collect();
    let trees = PhaseTrees::build(comm, nsupers, &needs_x, &contributes, options.tree_shape)?;

    let active = trees.active_rows();
    let recvs = trees.recv_counts();
    let pending_reduce = recvs.iter().sum();
    let pending_bcast = trees.expected_broadcasts();
    let deps = DepTable::new(&mods, recvs, active.clone());
    let lsum = BlockVec::new(&grid, partition, nrhs, |k| active[grid.lbi(k)]);

    let mut engine = Engine {
        comm,
        grid,
        partition,
        sweep,
        trees,
        deps,
        x,
        lsum,
        ready: VecDeque::new(),
        pending_bcast,
        pending_reduce,
        nrhs,
        trace: options.trace,
        stats,
    };

    let rows: Vec<usize> = engine.deps.active_rows().collect();
    let order: Box<dyn Iterator<Item = &usize>> = if sweep.descending() { Box::new(rows.iter().rev()) } else { Box::new(rows.iter()) };
    for &lib in order {
        if engine.deps.is_ready(lib) {
            engine.row_ready(lib)?;
        }
    }
    if options.trace.contains(Trace::SETUP) {
        log_setup(&grid, phase_name(sweep.phase()), &engine.trees, engine.ready.len());
    }

    loop {
        engine.drain_ready()?;
        if engine.pending_bcast == 0 && engine.pending_reduce == 0 {
            break;
        }
        let msg = timed(&mut engine.stats.comm_time, || comm.recv())?;
        engine.handle(msg)?;
    }
    engine.deps.verify_drained()
}
