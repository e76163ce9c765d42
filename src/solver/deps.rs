//! Dependency counters of one sweep on one process.
//!
//! For each local block row the table keeps the number of local block
//! modifications still to be folded into its lsum (fmod in the forward sweep,
//! bmod in the backward one) and the number of partial sums still expected
//! from reduction-tree children (frecv / brecv). A row is ready once both are
//! zero; solving or forwarding it sets the modification count to -1, after
//! which it is never touched again. Rows that take no part in the sweep on
//! this process are inactive.

use crate::error::GsError;

const SOLVED: i64 = -1;

#[derive(Debug, Clone)]
pub(crate) struct DepTable {
    mods: Vec<i64>,
    recvs: Vec<usize>,
    active: Vec<bool>,
}

impl DepTable {
    pub(crate) fn new(mods: &[usize], recvs: Vec<usize>, active: Vec<bool>) -> Self {
        debug_assert!(mods.len() == recvs.len() && mods.len() == active.len());
        DepTable { mods: mods.iter().map(|&m| m as i64).collect(), recvs, active }
    }

    fn check_active(&self, lib: usize, what: &str) -> Result<(), GsError> {
        match self.active.get(lib) {
            Some(true) => Ok(()),
            _ => Err(GsError::Protocol(format!("{what} on inactive local block row {lib}"))),
        }
    }

    pub(crate) fn is_active(&self, lib: usize) -> bool {
        self.active.get(lib).copied().unwrap_or(false)
    }

    pub(crate) fn is_ready(&self, lib: usize) -> bool {
        self.is_active(lib) && self.mods[lib] == 0 && self.recvs[lib] == 0
    }

    pub(crate) fn is_solved(&self, lib: usize) -> bool {
        self.mods[lib] == SOLVED
    }

    /// Record one folded block modification; returns whether the row became ready.
    pub(crate) fn fold(&mut self, lib: usize) -> Result<bool, GsError> {
        self.check_active(lib, "block update")?;
        if self.mods[lib] <= 0 {
            return Err(GsError::Protocol(format!("modification count of local block row {lib} underflows")));
        }
        self.mods[lib] -= 1;
        Ok(self.is_ready(lib))
    }

    /// Record one received partial sum; returns whether the row became ready.
    pub(crate) fn receive(&mut self, lib: usize) -> Result<bool, GsError> {
        self.check_active(lib, "partial sum")?;
        if self.recvs[lib] == 0 || self.is_solved(lib) {
            return Err(GsError::Protocol(format!("unexpected partial sum for local block row {lib}")));
        }
        self.recvs[lib] -= 1;
        Ok(self.is_ready(lib))
    }

    pub(crate) fn mark_solved(&mut self, lib: usize) -> Result<(), GsError> {
        if !self.is_ready(lib) {
            return Err(GsError::Protocol(format!("local block row {lib} solved before its dependencies")));
        }
        self.mods[lib] = SOLVED;
        Ok(())
    }

    /// Active rows in order; the sweep seeds from them.
    pub(crate) fn active_rows(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.active.iter().enumerate().filter(|(_, a)| **a).map(|(lib, _)| lib)
    }

    /// Every active row solved and every expected partial sum received.
    pub(crate) fn verify_drained(&self) -> Result<(), GsError> {
        for lib in self.active_rows() {
            if self.mods[lib] != SOLVED || self.recvs[lib] != 0 {
                return Err(GsError::Protocol(format!(
                    "local block row {lib} left with modification count {} and {} pending partial sums",
                    self.mods[lib], self.recvs[lib]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_becomes_ready_after_folds_and_receives() {
        let mut t = DepTable::new(&[2, 0, 0], vec![1, 0, 0], vec![true, true, false]);
        assert!(!t.is_ready(0));
        assert!(t.is_ready(1));
        assert!(!t.is_ready(2));
        assert!(!t.fold(0).unwrap());
        assert!(!t.receive(0).unwrap());
        assert!(t.fold(0).unwrap());
        t.mark_solved(0).unwrap();
        t.mark_solved(1).unwrap();
        t.verify_drained().unwrap();
    }

    #[test]
    fn underflow_and_inactive_rows_are_protocol_errors() {
        let mut t = DepTable::new(&[1, 0], vec![0, 0], vec![true, false]);
        t.fold(0).unwrap();
        assert!(matches!(t.fold(0), Err(GsError::Protocol(_))));
        assert!(matches!(t.receive(0), Err(GsError::Protocol(_))));
        assert!(matches!(t.fold(1), Err(GsError::Protocol(_))));
        t.mark_solved(0).unwrap();
        assert!(t.mark_solved(0).is_err());
    }

    #[test]
    fn undrained_table_is_reported() {
        let t = DepTable::new(&[0], vec![1], vec![true]);
        assert!(t.verify_drained().is_err());
    }
}
