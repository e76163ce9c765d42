//! Matrix module: supernode partition and block-sparse factor storage.

pub mod block;
pub mod distribute;
pub mod supernode;

pub use block::{LBlock, LBlockColumn, LocalFactors, UBlock, UBlockRow};
pub use distribute::distribute_factors;
pub use supernode::SupernodePartition;
