//! Sparse Matrix Imputation Library
//!
//! Column filtering and K-nearest-neighbor imputation for sparse numeric
//! matrices such as methylation beta-value tables, built with Rust, Polars
//! and Rayon.
//!
//! # Overview
//!
//! - **Sparsity Filtering**: Drop columns whose missing count exceeds a
//!   row-relative threshold, with sparsity before/after
//! - **KNN Imputation**: Fill missing cells from the K nearest rows under the
//!   nan-Euclidean distance
//! - **Automatic K Selection**: Evaluate candidate K values concurrently and
//!   keep the one with the lowest reconstruction RMSE
//! - **Progress Reporting**: Real-time progress updates with cancellation support
//! - **Table IO**: CSV/TSV loading and tab-separated result tables
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sparse_impute::{Pipeline, PipelineConfig, load_matrix};
//!
//! let matrix = load_matrix("data/betas.tsv")?;
//!
//! let config = PipelineConfig::builder()
//!     .threshold_percent(1.0)
//!     .k_candidates([5, 10, 15, 20])
//!     .concurrency(4)
//!     .output_dir("output")
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .process(&matrix)?;
//!
//! println!("Optimal K = {}", result.selection.optimal_k);
//! ```
//!
//! # Building Blocks
//!
//! Each stage is usable on its own:
//!
//! ```rust,ignore
//! use sparse_impute::{KNNImputer, SparsityFilter, select};
//!
//! let (filtered, removed, report) = SparsityFilter::filter(&matrix, 50.0)?;
//! let selection = select(&filtered, &[1, 3, 5], 2)?;
//!
//! let imputer = KNNImputer::new(3)?;
//! let filled = imputer.impute(&filtered);
//! let rmse = imputer.evaluate(&filtered)?;
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod imputers;
pub mod loader;
pub mod matrix;
pub mod pipeline;
pub mod reporting;
pub mod selection;
pub mod types;

// Re-exports for convenient access
pub use cleaner::SparsityFilter;
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{ImputeError, Result as ImputeResult, ResultExt};
pub use imputers::KNNImputer;
pub use loader::{LoadedMatrix, load_matrix, load_table};
pub use matrix::Matrix;
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use reporting::{ResultWriter, SavedOutputs, save_results};
pub use selection::{KSelector, select};
pub use types::{
    ErrorTable, EvaluationRecord, PipelineResult, PipelineSummary, SelectionResult,
    SparsityReport,
};
