//! Automatic neighbor-count selection.
//!
//! [`KSelector`] scores each candidate K by imputing the whole matrix and
//! measuring RMSE over the originally observed cells, then imputes with
//! the winner.

pub mod metrics;
mod selector;

pub use metrics::{masked_rmse, rmse};
pub use selector::{KSelector, select};
