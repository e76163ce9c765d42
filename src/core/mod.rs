//! Core building blocks: process grid and dense kernel interface.

pub mod grid;
pub mod traits;
pub mod wrappers;

pub use grid::ProcessGrid;
pub use traits::DenseKernels;
pub use wrappers::FaerKernels;
