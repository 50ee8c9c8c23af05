//! Pipeline module.
//!
//! This module provides the main imputation pipeline and its progress and
//! cancellation plumbing.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
