//! Integration tests for the sparse-matrix imputation pipeline.
//!
//! These tests verify end-to-end behavior of loading, filtering,
//! K selection and result saving using the fixtures in `tests/fixtures`.

use pretty_assertions::assert_eq;
use sparse_impute::reporting::{IMPUTED_MATRIX_FILE, RMSE_RESULTS_FILE, SPARSE_MATRIX_FILE};
use sparse_impute::{
    CancellationToken, ImputeError, KNNImputer, LoadedMatrix, Matrix, Pipeline, PipelineConfig,
    PipelineStage, ProgressUpdate, SparsityFilter, load_table, select,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_fixture(filename: &str) -> LoadedMatrix {
    load_table(fixtures_path().join(filename)).expect("Failed to load fixture")
}

fn methylation() -> Matrix {
    load_fixture("methylation_10x8.tsv").matrix
}

fn config_for(output_dir: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .threshold_percent(50.0)
        .k_candidates([1, 3, 5])
        .concurrency(3)
        .output_dir(output_dir)
        .build()
        .unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_methylation_fixture() {
    let loaded = load_fixture("methylation_10x8.tsv");
    let m = &loaded.matrix;

    assert_eq!(loaded.index_name, "probe");
    assert_eq!(m.shape(), (10, 8));
    assert_eq!(m.row_keys()[0], "S01");
    assert_eq!(m.missing_per_column(), vec![0, 1, 1, 1, 6, 1, 1, 1]);
}

#[test]
fn test_load_csv_fixture_with_empty_column() {
    let loaded = load_fixture("degenerate.csv");
    assert_eq!(loaded.index_name, "sample");
    assert_eq!(loaded.matrix.missing_per_column(), vec![1, 1, 4]);
}

// ============================================================================
// Filter + Select Scenario
// ============================================================================

#[test]
fn test_end_to_end_scenario() {
    let m = methylation();

    let (filtered, removed, report) = SparsityFilter::filter(&m, 50.0).unwrap();
    assert_eq!(removed, vec!["cg05".to_string()]);
    assert_eq!(filtered.shape(), (10, 7));
    assert!(report.new_sparsity < report.original_sparsity);

    let selection = select(&filtered, &[1, 3, 5], 3).unwrap();
    let ks: Vec<usize> = selection.error_table.iter().map(|r| r.k).collect();
    assert_eq!(ks, vec![1, 3, 5]);

    let min = selection
        .error_table
        .iter()
        .map(|r| r.rmse)
        .fold(f64::INFINITY, f64::min);
    let chosen = selection
        .error_table
        .iter()
        .find(|r| r.k == selection.optimal_k)
        .unwrap();
    assert_eq!(chosen.rmse, min);

    assert!(!selection.imputed.has_missing());
    assert_eq!(
        selection.imputed,
        KNNImputer::new(selection.optimal_k).unwrap().impute(&filtered)
    );
}

#[test]
fn test_selection_is_independent_of_concurrency() {
    let (filtered, _, _) = SparsityFilter::filter(&methylation(), 50.0).unwrap();

    let sequential = select(&filtered, &[5, 1, 3], 1).unwrap();
    let parallel = select(&filtered, &[5, 1, 3], 4).unwrap();

    assert_eq!(sequential.error_table, parallel.error_table);
    assert_eq!(sequential.optimal_k, parallel.optimal_k);
    assert_eq!(sequential.imputed, parallel.imputed);
}

#[test]
fn test_equal_errors_choose_first_candidate() {
    let (filtered, _, _) = SparsityFilter::filter(&methylation(), 50.0).unwrap();
    let selection = select(&filtered, &[5, 3, 1], 2).unwrap();

    // observed cells are never modified, so every K reconstructs them exactly
    assert!(selection.error_table.iter().all(|r| r.rmse == 0.0));
    assert_eq!(selection.optimal_k, 5);
}

#[test]
fn test_imputed_values_come_from_similar_rows() {
    let (filtered, _, _) = SparsityFilter::filter(&methylation(), 50.0).unwrap();
    let imputed = KNNImputer::new(3).unwrap().impute(&filtered);

    // S04 belongs to the low-cg01 group, whose cg02 values are all above 0.8
    let row = filtered.row_keys().iter().position(|k| k == "S04").unwrap();
    let col = filtered.column_index("cg02").unwrap();
    let value = imputed.get(row, col).unwrap();
    assert!(value > 0.8, "expected a high cg02 estimate, got {value}");
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[test]
fn test_full_pipeline_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("output");
    let loaded = load_fixture("methylation_10x8.tsv");

    let result = Pipeline::builder()
        .config(config_for(&out))
        .index_name(loaded.index_name.clone())
        .build()
        .unwrap()
        .process(&loaded.matrix)
        .expect("Pipeline should complete successfully");

    assert_eq!(
        files_in(&out),
        vec![IMPUTED_MATRIX_FILE, RMSE_RESULTS_FILE, SPARSE_MATRIX_FILE]
    );

    let outputs = result.outputs.as_ref().unwrap();
    let sparse = load_table(&outputs.sparse_matrix).unwrap();
    assert_eq!(sparse.index_name, "probe");
    assert_eq!(sparse.matrix, result.filtered);

    let imputed = load_table(&outputs.imputed_matrix).unwrap().matrix;
    assert_eq!(imputed.shape(), (10, 7));
    assert!(!imputed.has_missing());

    let rmse = std::fs::read_to_string(&outputs.rmse_results).unwrap();
    let lines: Vec<&str> = rmse.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "K Value\tRMSE");

    let summary = result.summary();
    assert_eq!(summary.rows, 10);
    assert_eq!(summary.columns_before, 8);
    assert_eq!(summary.columns_after, 7);
    assert_eq!(summary.remaining_missing, 0);
}

#[test]
fn test_degenerate_column_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("output");
    let loaded = load_fixture("degenerate.csv");

    // threshold above 100% keeps the all-missing column
    let config = config_for(&out)
        .to_builder()
        .threshold_percent(100.0)
        .k_candidates([1, 2])
        .build()
        .unwrap();

    let err = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(&loaded.matrix)
        .unwrap_err();

    match err.root() {
        ImputeError::EvaluationFailed { reason, .. } => assert!(reason.contains("'empty'")),
        other => panic!("expected EvaluationFailed, got {other}"),
    }
    assert_eq!(err.error_code(), "EVALUATION_FAILED");
    assert!(files_in(&out).is_empty());
}

#[test]
fn test_pipeline_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path())
        .to_builder()
        .save_to_disk(false)
        .build()
        .unwrap();

    let result = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(&methylation())
        .unwrap();

    assert!(result.outputs.is_none());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_pipeline_from_json_config() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"{{ "threshold_percent": 50.0, "k_candidates": [3, 1], "concurrency": 2, "output_dir": {:?} }}"#,
        dir.path().join("json_out").display().to_string()
    );
    let config: PipelineConfig = serde_json::from_str(&json).unwrap();
    config.validate().unwrap();

    let result = Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .process(&methylation())
        .unwrap();

    let ks: Vec<usize> = result.selection.error_table.iter().map(|r| r.k).collect();
    assert_eq!(ks, vec![3, 1]);
    assert_eq!(files_in(&dir.path().join("json_out")).len(), 3);
}

// ============================================================================
// Cancellation and Progress
// ============================================================================

#[test]
fn test_cancelled_pipeline_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let result = Pipeline::builder()
        .config(config_for(dir.path()))
        .cancellation_token(token)
        .build()
        .unwrap()
        .process(&methylation());

    assert!(matches!(result, Err(ImputeError::Cancelled)));
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_cancel_from_progress_callback() {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let config = PipelineConfig::builder()
        .threshold_percent(50.0)
        .k_candidates([1, 2, 3, 4, 5])
        .concurrency(1)
        .save_to_disk(false)
        .build()
        .unwrap();

    let result = Pipeline::builder()
        .config(config)
        .cancellation_token(token)
        .on_progress(move |update| {
            if update.stage == PipelineStage::Evaluation {
                token_clone.cancel();
            }
        })
        .build()
        .unwrap()
        .process(&methylation());

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_progress_reports_each_candidate() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let stages = Arc::new(Mutex::new(Vec::new()));
    let evaluations_clone = evaluations.clone();
    let stages_clone = stages.clone();

    let dir = tempfile::tempdir().unwrap();
    Pipeline::builder()
        .config(config_for(dir.path()))
        .on_progress(move |update: ProgressUpdate| {
            if update.stage == PipelineStage::Evaluation {
                evaluations_clone.fetch_add(1, Ordering::SeqCst);
                assert_eq!(update.items_total, Some(3));
            }
            assert!((0.0..=1.0).contains(&update.progress));
            stages_clone.lock().unwrap().push(update.stage);
        })
        .build()
        .unwrap()
        .process(&methylation())
        .unwrap();

    assert_eq!(evaluations.load(Ordering::SeqCst), 3);

    let mut stages = stages.lock().unwrap().clone();
    stages.dedup();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Initializing,
            PipelineStage::Filtering,
            PipelineStage::Evaluation,
            PipelineStage::FinalImputation,
            PipelineStage::Saving,
            PipelineStage::Complete,
        ]
    );
}
