//! Result tables.
//!
//! This module writes the outputs of a pipeline run as tab-separated files:
//! `sparse_matrix.tsv` (the filtered matrix), `imputed_matrix.tsv` (the
//! matrix filled with the chosen K) and `rmse_results.tsv` (the error table).
//!
//! # Example
//!
//! ```rust,ignore
//! use sparse_impute::reporting::ResultWriter;
//!
//! let saved = ResultWriter::new("output")
//!     .with_index_name("probe")
//!     .save(&result.filtered, &result.selection.imputed, &result.selection.error_table)?;
//! println!("{}", saved.imputed_matrix.display());
//! ```

mod writer;

pub use writer::{
    IMPUTED_MATRIX_FILE, RMSE_RESULTS_FILE, ResultWriter, SPARSE_MATRIX_FILE, SavedOutputs,
    error_table_to_dataframe, matrix_to_dataframe, save_results,
};
