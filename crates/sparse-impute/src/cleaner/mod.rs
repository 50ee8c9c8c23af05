//! Dataset cleaning before imputation.
//!
//! Currently this is sparse-column removal: features missing in too many
//! samples are dropped so the neighbor search has enough shared signal.

mod sparsity;

pub use sparsity::SparsityFilter;
