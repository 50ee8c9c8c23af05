use crate::error::{ImputeError, Result};
use crate::imputers::KNNImputer;
use crate::matrix::Matrix;
use crate::pipeline::progress::{CancellationToken, PipelineStage, ProgressReporter, ProgressUpdate};
use crate::types::{ErrorTable, EvaluationRecord, SelectionResult};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Chooses the neighbor count with the lowest masked reconstruction error.
///
/// Every candidate is evaluated on a worker pool that lives only for the
/// duration of one [`select`](Self::select) call.
#[derive(Default, Clone)]
pub struct KSelector {
    cancellation_token: CancellationToken,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

/// What one worker produced for its candidate.
enum TaskOutcome {
    Done(EvaluationRecord),
    Failed(ImputeError),
    /// Not started because an earlier failure or a cancellation stopped the run.
    Skipped,
}

impl KSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Evaluate each candidate K, pick the best, and impute with it.
    ///
    /// The returned error table has one record per candidate, in candidate
    /// order, whatever order the workers finish in. Ties on RMSE go to the
    /// earlier candidate.
    ///
    /// # Errors
    ///
    /// - [`ImputeError::InvalidParameter`] for an empty candidate list, a
    ///   zero K, or zero concurrency, before any work starts.
    /// - [`ImputeError::InputShape`] for a matrix without rows or columns.
    /// - The first failing evaluation in candidate order, typically
    ///   [`ImputeError::EvaluationFailed`]. Candidates not yet started when
    ///   a failure occurs are skipped.
    /// - [`ImputeError::Cancelled`] if the token is cancelled.
    pub fn select(
        &self,
        matrix: &Matrix,
        k_candidates: &[usize],
        concurrency: usize,
    ) -> Result<SelectionResult> {
        validate_parameters(matrix, k_candidates, concurrency)?;
        self.check_cancelled()?;

        let start = Instant::now();
        info!(
            "Evaluating K = {:?} on {} worker threads ({} x {} matrix)",
            k_candidates,
            concurrency,
            matrix.n_rows(),
            matrix.n_cols()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|idx| format!("k-eval-{idx}"))
            .build()
            .map_err(|e| ImputeError::Internal(format!("failed to build worker pool: {e}")))?;

        let mask = matrix.observed_mask();
        let abort = AtomicBool::new(false);
        let finished = AtomicUsize::new(0);

        let outcomes: Vec<TaskOutcome> = pool.install(|| {
            k_candidates
                .par_iter()
                .map(|&k| {
                    let outcome = self.run_task(matrix, &mask, k, &abort);
                    if matches!(outcome, TaskOutcome::Done(_) | TaskOutcome::Failed(_)) {
                        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                        self.report_progress(ProgressUpdate::with_items(
                            PipelineStage::Evaluation,
                            format!("K={k}"),
                            done,
                            k_candidates.len(),
                            format!("Evaluated K={k} ({done}/{})", k_candidates.len()),
                        ));
                    }
                    outcome
                })
                .collect()
        });

        let error_table = merge_outcomes(outcomes)?;
        let best = *error_table
            .best()
            .ok_or_else(|| ImputeError::Internal("error table is empty".to_string()))?;

        info!(
            "Optimal K = {} (RMSE {:.6}); evaluation took {:?}",
            best.k,
            best.rmse,
            start.elapsed()
        );

        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FinalImputation,
            0.0,
            format!("Imputing with K={}", best.k),
        ));

        let imputer = KNNImputer::new(best.k)?;
        let imputed = pool.install(|| imputer.impute(matrix));

        if imputed.has_missing() {
            warn!(
                "{} cells remain missing after imputation",
                imputed.missing_count()
            );
        }
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FinalImputation,
            1.0,
            "Final imputation complete",
        ));

        Ok(SelectionResult {
            optimal_k: best.k,
            error_table,
            imputed,
        })
    }

    fn run_task(&self, matrix: &Matrix, mask: &[bool], k: usize, abort: &AtomicBool) -> TaskOutcome {
        if abort.load(Ordering::SeqCst) {
            debug!("Skipping K={} after an earlier failure", k);
            return TaskOutcome::Skipped;
        }
        if self.cancellation_token.is_cancelled() {
            abort.store(true, Ordering::SeqCst);
            return TaskOutcome::Failed(ImputeError::Cancelled);
        }

        let started = Instant::now();
        let result = KNNImputer::new(k).and_then(|imputer| imputer.evaluate_masked(matrix, mask));

        match result {
            Ok(rmse) => {
                debug!("K={} RMSE={:.6} in {:?}", k, rmse, started.elapsed());
                TaskOutcome::Done(EvaluationRecord { k, rmse })
            }
            Err(e) => {
                warn!("Evaluation of K={} failed: {}", k, e);
                abort.store(true, Ordering::SeqCst);
                TaskOutcome::Failed(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(ImputeError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

/// Evaluate `k_candidates` on `matrix` with `concurrency` worker threads.
///
/// Shorthand for [`KSelector::select`] without cancellation or progress.
pub fn select(matrix: &Matrix, k_candidates: &[usize], concurrency: usize) -> Result<SelectionResult> {
    KSelector::new().select(matrix, k_candidates, concurrency)
}

fn validate_parameters(matrix: &Matrix, k_candidates: &[usize], concurrency: usize) -> Result<()> {
    if k_candidates.is_empty() {
        return Err(ImputeError::invalid_parameter(
            "k_candidates",
            "at least one candidate K is required",
        ));
    }
    if let Some(pos) = k_candidates.iter().position(|&k| k == 0) {
        return Err(ImputeError::invalid_parameter(
            "k_candidates",
            format!("candidate at position {pos} is 0; K must be at least 1"),
        ));
    }
    if concurrency == 0 {
        return Err(ImputeError::invalid_parameter(
            "concurrency",
            "at least one worker thread is required",
        ));
    }
    if matrix.is_empty() {
        return Err(ImputeError::InputShape {
            rows: matrix.n_rows(),
            columns: matrix.n_cols(),
            reason: "nothing to impute".to_string(),
        });
    }
    Ok(())
}

/// Rebuild the error table in candidate order, surfacing the first failure.
fn merge_outcomes(outcomes: Vec<TaskOutcome>) -> Result<ErrorTable> {
    let mut records = Vec::with_capacity(outcomes.len());
    let mut skipped = false;

    for outcome in outcomes {
        match outcome {
            TaskOutcome::Done(record) => records.push(record),
            TaskOutcome::Failed(e) => return Err(e),
            TaskOutcome::Skipped => skipped = true,
        }
    }

    // A skip is only ever caused by a failure, which returned above
    if skipped {
        return Err(ImputeError::Internal(
            "candidate evaluations were skipped without a recorded failure".to_string(),
        ));
    }
    Ok(ErrorTable::new(records))
}
