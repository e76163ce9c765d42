//! Block-partitioned X and lsum working arrays.
//!
//! Both are indexed by local block row. Every stored block records the global
//! supernode it belongs to, so a block can be shipped as a message payload
//! without extra bookkeeping.

use crate::core::ProcessGrid;
use crate::error::GsError;
use crate::matrix::SupernodePartition;
use faer::{Mat, MatRef};

/// One supernode's `size x nrhs` slice of X or lsum.
#[derive(Debug, Clone, PartialEq)]
pub struct XBlock {
    pub supernode: usize,
    pub data: Mat<f64>,
}

impl XBlock {
    pub fn zeros(supernode: usize, rows: usize, nrhs: usize) -> Self {
        XBlock { supernode, data: Mat::zeros(rows, nrhs) }
    }

    /// Values in column-major order.
    pub fn to_payload(&self) -> Vec<f64> {
        payload_of(self.data.as_ref())
    }

    /// Add a column-major payload of the same shape.
    pub fn add_payload(&mut self, payload: &[f64]) -> Result<(), GsError> {
        let rows = self.data.nrows();
        if payload.len() != rows * self.data.ncols() {
            return Err(GsError::Protocol(format!(
                "payload of {} words for a {} x {} block of supernode {}",
                payload.len(),
                rows,
                self.data.ncols(),
                self.supernode
            )));
        }
        for j in 0..self.data.ncols() {
            for i in 0..rows {
                self.data[(i, j)] += payload[i + j * rows];
            }
        }
        Ok(())
    }
}

pub(crate) fn payload_of(m: MatRef<'_, f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(m.nrows() * m.ncols());
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            out.push(m[(i, j)]);
        }
    }
    out
}

/// Rebuild a `rows x nrhs` block from a column-major payload.
pub(crate) fn block_from_payload(rows: usize, nrhs: usize, payload: &[f64]) -> Result<Mat<f64>, GsError> {
    if payload.len() != rows * nrhs {
        return Err(GsError::Protocol(format!("payload of {} words, {rows} x {nrhs} expected", payload.len())));
    }
    Ok(Mat::from_fn(rows, nrhs, |i, j| payload[i + j * rows]))
}

/// Blocks of X or lsum held by one process, by local block row.
#[derive(Debug, Clone)]
pub struct BlockVec {
    nrhs: usize,
    blocks: Vec<Option<XBlock>>,
}

impl BlockVec {
    /// Zero blocks for the owned block rows `k` with `keep(k)`.
    pub fn new(grid: &ProcessGrid, partition: &SupernodePartition, nrhs: usize, keep: impl Fn(usize) -> bool) -> Self {
        let nsupers = partition.nsupers();
        let blocks = (0..grid.num_local_rows(nsupers))
            .map(|lib| {
                let k = grid.row_block(lib);
                (k < nsupers && keep(k)).then(|| XBlock::zeros(k, partition.size(k), nrhs))
            })
            .collect();
        BlockVec { nrhs, blocks }
    }

    /// X layout: one block per supernode whose diagonal this process holds.
    pub fn diagonal(grid: &ProcessGrid, partition: &SupernodePartition, nrhs: usize) -> Self {
        Self::new(grid, partition, nrhs, |k| grid.is_diag(k))
    }

    pub fn nrhs(&self) -> usize {
        self.nrhs
    }

    pub fn get(&self, lib: usize) -> Option<&XBlock> {
        self.blocks.get(lib).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, lib: usize) -> Option<&mut XBlock> {
        self.blocks.get_mut(lib).and_then(Option::as_mut)
    }

    /// Block `lib`, or a protocol error naming `what` if it is not held here.
    pub(crate) fn expect_mut(&mut self, lib: usize, what: &str) -> Result<&mut XBlock, GsError> {
        self.get_mut(lib)
            .ok_or_else(|| GsError::Protocol(format!("{what}: local block row {lib} is not held here")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &XBlock> {
        self.blocks.iter().flatten()
    }
}
