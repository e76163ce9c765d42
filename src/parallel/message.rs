//! Point-to-point message envelope of the solve engines.
//!
//! A message carries a solved X block down a broadcast tree or a partial
//! sum up a reduction tree. On the wire it is a flat `f64` buffer whose first
//! word is the supernode index, followed by the `size x nrhs` payload in
//! column-major order; phase and kind travel in the transport tag.

use crate::error::GsError;

/// Which sweep a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forward,
    Backward,
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    /// A solved X block travelling down its block-column broadcast tree.
    Broadcast,
    /// A partial sum travelling up its block-row reduction tree.
    Reduce,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub phase: Phase,
    pub kind: MsgKind,
    pub supernode: usize,
    pub payload: Vec<f64>,
}

/// Words prepended to the payload on the wire.
pub const HEADER_LEN: usize = 1;

impl Message {
    pub fn new(phase: Phase, kind: MsgKind, supernode: usize, payload: Vec<f64>) -> Self {
        Message { phase, kind, supernode, payload }
    }

    pub fn tag(&self) -> i32 {
        let phase = match self.phase {
            Phase::Forward => 0,
            Phase::Backward => 1,
        };
        let kind = match self.kind {
            MsgKind::Broadcast => 0,
            MsgKind::Reduce => 1,
        };
        2 * phase + kind
    }

    pub fn from_tag(tag: i32) -> Option<(Phase, MsgKind)> {
        match tag {
            0 => Some((Phase::Forward, MsgKind::Broadcast)),
            1 => Some((Phase::Forward, MsgKind::Reduce)),
            2 => Some((Phase::Backward, MsgKind::Broadcast)),
            3 => Some((Phase::Backward, MsgKind::Reduce)),
            _ => None,
        }
    }

    /// Number of `f64` words on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self) -> Vec<f64> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.push(self.supernode as f64);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(tag: i32, mut buf: Vec<f64>) -> Result<Self, GsError> {
        let (phase, kind) = Self::from_tag(tag)
            .ok_or_else(|| GsError::Protocol(format!("unexpected message tag {tag}")))?;
        if buf.len() < HEADER_LEN {
            return Err(GsError::Protocol("message shorter than its header".into()));
        }
        let head = buf[0];
        let supernode: usize = num_traits::cast(head)
            .filter(|&k: &usize| k as f64 == head)
            .ok_or_else(|| GsError::Protocol(format!("bad supernode header {head}")))?;
        buf.drain(..HEADER_LEN);
        Ok(Message { phase, kind, supernode, payload: buf })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_per_phase_and_kind() {
        let mut tags: Vec<i32> = [Phase::Forward, Phase::Backward]
            .into_iter()
            .flat_map(|p| [MsgKind::Broadcast, MsgKind::Reduce].map(|k| Message::new(p, k, 0, vec![]).tag()))
            .collect();
        tags.dedup();
        assert_eq!(tags, vec![0, 1, 2, 3]);
    }

    #[test]
    fn wire_form_carries_header_first() {
        let m = Message::new(Phase::Backward, MsgKind::Reduce, 17, vec![1.0, -2.0]);
        let buf = m.encode();
        assert_eq!(buf, vec![17.0, 1.0, -2.0]);
        assert_eq!(Message::decode(m.tag(), buf).unwrap(), m);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Message::decode(9, vec![0.0]).is_err());
        assert!(Message::decode(0, vec![]).is_err());
        assert!(Message::decode(0, vec![2.5, 1.0]).is_err());
        assert!(Message::decode(0, vec![-1.0]).is_err());
    }
}
