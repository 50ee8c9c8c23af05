use crate::matrix::Matrix;
use crate::reporting::SavedOutputs;
use serde::{Deserialize, Serialize};

/// Outcome of sparse-column filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityReport {
    /// Removed feature names, in their original column order.
    pub columns_removed: Vec<String>,
    /// Percentage of missing cells before filtering (0-100).
    pub original_sparsity: f64,
    /// Percentage of missing cells after filtering (0-100).
    pub new_sparsity: f64,
    /// `original_sparsity - new_sparsity`
    pub reduction: f64,
}

/// RMSE of one candidate K.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub k: usize,
    pub rmse: f64,
}

/// Evaluation records in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorTable {
    records: Vec<EvaluationRecord>,
}

impl ErrorTable {
    pub fn new(records: Vec<EvaluationRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvaluationRecord> {
        self.records.iter()
    }

    /// Index of the lowest RMSE; the earliest record wins ties.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, record) in self.records.iter().enumerate() {
            match best {
                Some((_, rmse)) if record.rmse >= rmse => {}
                _ => best = Some((idx, record.rmse)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Record with the lowest RMSE; the earliest record wins ties.
    pub fn best(&self) -> Option<&EvaluationRecord> {
        self.best_index().map(|idx| &self.records[idx])
    }
}

/// Chosen K, the full error table, and the matrix imputed with the chosen K.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub optimal_k: usize,
    pub error_table: ErrorTable,
    pub imputed: Matrix,
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Input matrix after sparse-column removal.
    pub filtered: Matrix,
    pub sparsity: SparsityReport,
    pub selection: SelectionResult,
    /// Where the result tables were written, if saving was enabled.
    pub outputs: Option<SavedOutputs>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn summary(&self) -> PipelineSummary {
        let columns_after = self.filtered.n_cols();
        PipelineSummary {
            rows: self.filtered.n_rows(),
            columns_before: columns_after + self.sparsity.columns_removed.len(),
            columns_after,
            sparsity: self.sparsity.clone(),
            error_table: self.selection.error_table.clone(),
            optimal_k: self.selection.optimal_k,
            remaining_missing: self.selection.imputed.missing_count(),
            output_dir: self.outputs.as_ref().and_then(|o| {
                o.sparse_matrix
                    .parent()
                    .map(|dir| dir.display().to_string())
            }),
            duration_ms: self.duration_ms,
        }
    }
}

/// Serializable overview of a run, printed by the CLI under `--json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub rows: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub sparsity: SparsityReport,
    pub error_table: ErrorTable,
    pub optimal_k: usize,
    pub remaining_missing: usize,
    pub output_dir: Option<String>,
    pub duration_ms: u64,
}
