//! Supernode partition of the matrix rows and columns.

use crate::error::GsError;

/// Contiguous partition of `0..n` into supernodes.
///
/// Supernode `k` covers rows `xsup[k]..xsup[k + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupernodePartition {
    xsup: Vec<usize>,
}

impl SupernodePartition {
    /// Build from the boundary array `xsup` (`xsup[0] == 0`, strictly increasing).
    pub fn new(xsup: Vec<usize>) -> Result<Self, GsError> {
        if xsup.len() < 2 || xsup[0] != 0 {
            return Err(GsError::Structure("supernode boundaries must start at 0 and name at least one supernode".into()));
        }
        if let Some(w) = xsup.windows(2).find(|w| w[1] <= w[0]) {
            return Err(GsError::Structure(format!("empty supernode between rows {} and {}", w[0], w[1])));
        }
        Ok(SupernodePartition { xsup })
    }

    pub fn from_sizes(sizes: &[usize]) -> Result<Self, GsError> {
        let mut xsup = Vec::with_capacity(sizes.len() + 1);
        xsup.push(0);
        for &s in sizes {
            xsup.push(xsup[xsup.len() - 1] + s);
        }
        Self::new(xsup)
    }

    /// Order of the matrix.
    pub fn n(&self) -> usize {
        self.xsup[self.xsup.len() - 1]
    }

    pub fn nsupers(&self) -> usize {
        self.xsup.len() - 1
    }

    /// Number of columns in supernode `k`.
    pub fn size(&self, k: usize) -> usize {
        self.xsup[k + 1] - self.xsup[k]
    }

    /// First global row of supernode `k`.
    pub fn first_row(&self, k: usize) -> usize {
        self.xsup[k]
    }

    pub fn rows(&self, k: usize) -> std::ops::Range<usize> {
        self.xsup[k]..self.xsup[k + 1]
    }

    /// Supernode containing global row `row`.
    pub fn block_of(&self, row: usize) -> usize {
        debug_assert!(row < self.n());
        self.xsup.partition_point(|&start| start <= row) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_lookup() {
        let p = SupernodePartition::from_sizes(&[2, 3, 1]).unwrap();
        assert_eq!(p.n(), 6);
        assert_eq!(p.nsupers(), 3);
        assert_eq!(p.block_of(0), 0);
        assert_eq!(p.block_of(1), 0);
        assert_eq!(p.block_of(2), 1);
        assert_eq!(p.block_of(4), 1);
        assert_eq!(p.block_of(5), 2);
        assert_eq!(p.first_row(2), 5);
    }

    #[test]
    fn rejects_empty_supernodes() {
        assert!(SupernodePartition::from_sizes(&[2, 0, 1]).is_err());
        assert!(SupernodePartition::new(vec![0]).is_err());
        assert!(SupernodePartition::new(vec![1, 3]).is_err());
    }
}
