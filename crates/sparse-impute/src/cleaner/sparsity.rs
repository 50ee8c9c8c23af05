use crate::error::{ImputeError, Result};
use crate::matrix::Matrix;
use crate::types::SparsityReport;
use tracing::{debug, info};

/// Removes columns whose missing count exceeds a row-relative threshold.
pub struct SparsityFilter;

impl SparsityFilter {
    /// Drop every column with more than `threshold_percent`% of its cells missing.
    ///
    /// The absolute cut-off is `threshold_percent / 100 * rows`; a column
    /// whose missing count equals the cut-off is kept. Rows are never
    /// removed and surviving columns keep their relative order.
    ///
    /// # Errors
    ///
    /// [`ImputeError::InvalidParameter`] for a negative or non-finite threshold.
    pub fn filter(
        matrix: &Matrix,
        threshold_percent: f64,
    ) -> Result<(Matrix, Vec<String>, SparsityReport)> {
        if !threshold_percent.is_finite() || threshold_percent < 0.0 {
            return Err(ImputeError::invalid_parameter(
                "threshold_percent",
                format!("must be a finite value >= 0, got {threshold_percent}"),
            ));
        }

        let threshold = threshold_percent / 100.0 * matrix.n_rows() as f64;
        debug!(
            "Sparse-column cut-off: {:.2} missing cells ({}% of {} rows)",
            threshold,
            threshold_percent,
            matrix.n_rows()
        );

        let mut keep = Vec::with_capacity(matrix.n_cols());
        let mut removed = Vec::new();
        for (idx, missing) in matrix.missing_per_column().into_iter().enumerate() {
            if missing as f64 > threshold {
                removed.push(matrix.columns()[idx].clone());
            } else {
                keep.push(idx);
            }
        }

        let filtered = if removed.is_empty() {
            matrix.clone()
        } else {
            matrix.select_columns(&keep)
        };

        let original_sparsity = matrix.sparsity_percent();
        let new_sparsity = filtered.sparsity_percent();
        let report = SparsityReport {
            columns_removed: removed.clone(),
            original_sparsity,
            new_sparsity,
            reduction: original_sparsity - new_sparsity,
        };

        info!(
            "Removed {} of {} columns; sparsity {:.2}% -> {:.2}%",
            removed.len(),
            matrix.n_cols(),
            original_sparsity,
            new_sparsity
        );

        Ok((filtered, removed, report))
    }
}
