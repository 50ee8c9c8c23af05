//! Progress reporting and cancellation support for the imputation pipeline.
//!
//! The K evaluations run on worker threads, so both the reporter and the
//! cancellation token are `Send + Sync` and cheap to share.
//!
//! # Example
//!
//! ```rust,ignore
//! use sparse_impute::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     token_clone.cancel();
//! });
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .process(matrix);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stages of the imputation pipeline.
///
/// Progress updates include both the current stage and optional sub-stage
/// information (e.g. `"K=10"` during evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Pipeline is validating its input
    Initializing,
    /// Removing sparse columns
    Filtering,
    /// Evaluating candidate K values
    Evaluation,
    /// Imputing the filtered matrix with the chosen K
    FinalImputation,
    /// Writing result tables
    Saving,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline was cancelled by user
    Cancelled,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Filtering => "Filtering Sparse Columns",
            Self::Evaluation => "Evaluating K",
            Self::FinalImputation => "Imputing Values",
            Self::Saving => "Saving Results",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    ///
    /// Weights of the non-terminal stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Filtering => 0.08,
            Self::Evaluation => 0.60,
            Self::FinalImputation => 0.20,
            Self::Saving => 0.10,
            Self::Complete => 0.0,
            Self::Cancelled => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Filtering => 0.02,
            Self::Evaluation => 0.10,
            Self::FinalImputation => 0.70,
            Self::Saving => 0.90,
            Self::Complete => 1.0,
            Self::Cancelled => 0.0,
            Self::Failed => 0.0,
        }
    }
}

/// A single progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Optional sub-stage description (e.g. `"K=15"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    /// Finished candidates so far, during evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    fn at(stage: PipelineStage, stage_progress: f32, message: String) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        let progress = stage.base_progress() + stage.weight() * stage_progress;
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress,
            message,
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update for a stage without sub-stage info.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        Self::at(stage, stage_progress, message.into())
    }

    /// Creates a progress update with item counts, e.g. `current` of `total`
    /// candidate evaluations finished.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::at(stage, stage_progress, message.into())
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::at(PipelineStage::Complete, 1.0, message.into())
    }

    pub fn cancelled() -> Self {
        Self::at(
            PipelineStage::Cancelled,
            0.0,
            "Pipeline cancelled by user".to_string(),
        )
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::at(PipelineStage::Failed, 0.0, message.into())
    }
}

/// Receiver of progress updates.
///
/// Evaluation updates are emitted from worker threads, in completion
/// order rather than candidate order.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline from another thread.
///
/// Clones share one flag. The pipeline checks it between stages and each
/// K evaluation checks it before starting; a cancelled run returns
/// [`ImputeError::Cancelled`](crate::error::ImputeError::Cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Thread-safe.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancellation_token_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();
        assert!(!token2.is_cancelled());

        token1.cancel();
        assert!(token2.is_cancelled());

        token2.reset();
        assert!(!token1.is_cancelled());
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(PipelineStage::FinalImputation, 0.5, "Imputing...");
        assert_eq!(update.stage, PipelineStage::FinalImputation);
        assert!(update.sub_stage.is_none());
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_progress_update_with_items() {
        let update = ProgressUpdate::with_items(
            PipelineStage::Evaluation,
            "K=10",
            2,
            4,
            "Evaluated K=10",
        );
        assert_eq!(update.sub_stage, Some("K=10".to_string()));
        assert_eq!(update.stage_progress, 0.5);
        assert_eq!(update.items_processed, Some(2));
        assert_eq!(update.items_total, Some(4));
        assert!((update.progress - 0.40).abs() < 1e-6);
    }

    #[test]
    fn test_progress_update_terminal_states() {
        assert_eq!(ProgressUpdate::complete("Done").progress, 1.0);
        assert_eq!(ProgressUpdate::cancelled().stage, PipelineStage::Cancelled);
        assert_eq!(ProgressUpdate::failed("boom").message, "boom");
    }

    #[test]
    fn test_pipeline_stage_weights_sum() {
        let stages = [
            PipelineStage::Initializing,
            PipelineStage::Filtering,
            PipelineStage::Evaluation,
            PipelineStage::FinalImputation,
            PipelineStage::Saving,
        ];

        let total_weight: f32 = stages.iter().map(|s| s.weight()).sum();
        assert!((total_weight - 1.0).abs() < 0.01, "Weights should sum to ~1.0");

        for pair in stages.windows(2) {
            let expected = pair[0].base_progress() + pair[0].weight();
            assert!((pair[1].base_progress() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pipeline_stage_json_values() {
        let stage_expectations = [
            (PipelineStage::Initializing, "\"initializing\""),
            (PipelineStage::Filtering, "\"filtering\""),
            (PipelineStage::Evaluation, "\"evaluation\""),
            (PipelineStage::FinalImputation, "\"final_imputation\""),
            (PipelineStage::Saving, "\"saving\""),
            (PipelineStage::Complete, "\"complete\""),
            (PipelineStage::Cancelled, "\"cancelled\""),
            (PipelineStage::Failed, "\"failed\""),
        ];

        for (stage, expected_json) in stage_expectations {
            let json = serde_json::to_string(&stage).expect("Should serialize");
            assert_eq!(json, expected_json, "{:?} should serialize to {}", stage, expected_json);
        }
    }

    #[test]
    fn test_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    reporter.report(ProgressUpdate::with_items(
                        PipelineStage::Evaluation,
                        format!("K={i}"),
                        i + 1,
                        4,
                        "worker",
                    ));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread should not panic");
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 4);
    }
}
