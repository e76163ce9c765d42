//! Broadcast and reduction trees over a subset of one grid row or column.
//!
//! A tree is built from its member ranks listed root first. With
//! [`TreeShape::Flat`] the root talks to every other member directly; with
//! [`TreeShape::Binary`] member `i` has parent `(i - 1) / 2` and children
//! `2i + 1` and `2i + 2`, which bounds the per-rank fan-out to two and the
//! depth to `log2(members)`.
//!
//! A broadcast tree carries a solved X block from the diagonal process down
//! its block column; a reduction tree carries partial sums from the members
//! of a block row up to the diagonal process. Each rank only keeps its own
//! neighbourhood of the tree.

use crate::error::GsError;
use crate::parallel::{GridComm, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeShape {
    Flat,
    Binary,
}

/// One rank's view of a tree: its parent and its children.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Neighbourhood {
    root: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Neighbourhood {
    fn build(members: &[usize], me: usize, shape: TreeShape) -> Result<Self, GsError> {
        let pos = members
            .iter()
            .position(|&r| r == me)
            .ok_or_else(|| GsError::Protocol(format!("rank {me} is not a member of tree {members:?}")))?;
        let root = members[0];
        let (parent, children) = match shape {
            TreeShape::Flat if pos == 0 => (None, members[1..].to_vec()),
            TreeShape::Flat => (Some(root), Vec::new()),
            TreeShape::Binary => {
                let parent = (pos > 0).then(|| members[(pos - 1) / 2]);
                let children = [2 * pos + 1, 2 * pos + 2]
                    .into_iter()
                    .filter_map(|c| members.get(c).copied())
                    .collect();
                (parent, children)
            }
        };
        Ok(Neighbourhood { root, parent, children })
    }
}

/// Broadcast tree of one block column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcastTree {
    hood: Neighbourhood,
}

impl BcastTree {
    /// `members` lists the root (the diagonal process) first.
    pub fn new(members: &[usize], me: usize, shape: TreeShape) -> Result<Self, GsError> {
        Ok(BcastTree { hood: Neighbourhood::build(members, me, shape)? })
    }

    pub fn is_root(&self) -> bool {
        self.hood.parent.is_none()
    }

    pub fn root(&self) -> usize {
        self.hood.root
    }

    /// Ranks this rank forwards the broadcast to.
    pub fn children(&self) -> &[usize] {
        &self.hood.children
    }

    pub fn dest_count(&self) -> usize {
        self.hood.children.len()
    }

    /// Whether this rank expects the broadcast message from a parent.
    pub fn expects_message(&self) -> bool {
        !self.is_root()
    }

    /// Send `msg` to every child; returns the number of messages sent.
    pub fn forward<C: GridComm + ?Sized>(&self, comm: &C, msg: &Message) -> Result<usize, GsError> {
        for &child in &self.hood.children {
            comm.send(child, msg)?;
        }
        Ok(self.hood.children.len())
    }
}

/// Reduction tree of one block row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTree {
    hood: Neighbourhood,
}

impl ReduceTree {
    /// `members` lists the root (the diagonal process) first.
    pub fn new(members: &[usize], me: usize, shape: TreeShape) -> Result<Self, GsError> {
        Ok(ReduceTree { hood: Neighbourhood::build(members, me, shape)? })
    }

    pub fn is_root(&self) -> bool {
        self.hood.parent.is_none()
    }

    pub fn root(&self) -> usize {
        self.hood.root
    }

    pub fn parent(&self) -> Option<usize> {
        self.hood.parent
    }

    /// Partial sums this rank waits for before it is complete.
    pub fn recv_count(&self) -> usize {
        self.hood.children.len()
    }

    /// Send this rank's accumulated sum to its parent.
    pub fn forward<C: GridComm + ?Sized>(&self, comm: &C, msg: &Message) -> Result<usize, GsError> {
        match self.hood.parent {
            Some(p) => {
                comm.send(p, msg)?;
                Ok(1)
            }
            None => Err(GsError::Protocol(format!(
                "root of the reduction tree of supernode {} has no parent",
                msg.supernode
            ))),
        }
    }
}

/// Order tree members root first, the rest ascending.
pub fn root_first(root: usize, mut members: Vec<usize>) -> Vec<usize> {
    members.retain(|&r| r != root);
    members.sort_unstable();
    members.insert(0, root);
    members
}
