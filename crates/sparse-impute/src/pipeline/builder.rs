//! Main imputation pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating filter, K selection and result saving.

use crate::cleaner::SparsityFilter;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::{ImputeError, Result, ResultExt};
use crate::loader::DEFAULT_INDEX_NAME;
use crate::matrix::Matrix;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::ResultWriter;
use crate::selection::KSelector;
use crate::types::PipelineResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// The main imputation pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use sparse_impute::{CancellationToken, Pipeline, PipelineConfig, load_matrix};
///
/// let matrix = load_matrix("data/methylation.tsv")?;
/// let token = CancellationToken::new();
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().threshold_percent(50.0).build()?)
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .process(&matrix)?;
///
/// println!("Optimal K = {}", result.selection.optimal_k);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    writer: ResultWriter,
}

// Ensure Pipeline is Send (can be moved to another thread)
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filter sparse columns, select K, impute, and optionally save.
    ///
    /// Nothing is written unless filtering and selection both succeed.
    ///
    /// # Errors
    ///
    /// Returns `Err(ImputeError::Cancelled)` if the pipeline was cancelled
    /// via the cancellation token, [`ImputeError::InputShape`] when no rows or
    /// no columns survive filtering, and any selection or IO error.
    pub fn process(&self, matrix: &Matrix) -> Result<PipelineResult> {
        match self.process_internal(matrix) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed; optimal K = {}",
                    result.selection.optimal_k
                )));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Check if cancellation has been requested.
    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(ImputeError::Cancelled);
        }
        Ok(())
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(&self, matrix: &Matrix) -> Result<PipelineResult> {
        let start_time = Instant::now();

        info!(
            "Starting imputation pipeline on {} x {} matrix ({:.2}% missing)",
            matrix.n_rows(),
            matrix.n_cols(),
            matrix.sparsity_percent()
        );
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting imputation pipeline...",
        ));

        self.check_cancelled()?;

        // Step 1: Drop sparse columns
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Filtering,
            0.0,
            format!(
                "Removing columns above {}% missing...",
                self.config.threshold_percent
            ),
        ));
        info!("Step 1: Filtering sparse columns...");

        let (filtered, removed, sparsity) =
            SparsityFilter::filter(matrix, self.config.threshold_percent)?;

        if filtered.is_empty() {
            return Err(ImputeError::InputShape {
                rows: filtered.n_rows(),
                columns: filtered.n_cols(),
                reason: format!(
                    "no data left after filtering ({} of {} columns removed)",
                    removed.len(),
                    matrix.n_cols()
                ),
            });
        }

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Filtering,
            1.0,
            format!("Removed {} columns", removed.len()),
        ));

        self.check_cancelled()?;

        // Step 2: Evaluate candidates and impute with the best one
        info!("Step 2: Selecting K from {:?}...", self.config.k_candidates);
        let mut selector = KSelector::new().with_cancellation_token(self.cancellation_token.clone());
        if let Some(reporter) = &self.progress_reporter {
            selector = selector.with_progress_reporter(reporter.clone());
        }

        let selection = selector
            .select(&filtered, &self.config.k_candidates, self.config.concurrency)
            .context("K selection failed")?;

        self.check_cancelled()?;

        // Step 3: Save result tables
        let outputs = if self.config.save_to_disk {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Saving,
                0.0,
                format!("Saving outputs to {}...", self.writer.output_dir().display()),
            ));
            info!("Step 3: Saving outputs...");

            let saved = self
                .writer
                .save(&filtered, &selection.imputed, &selection.error_table)?;

            self.report_progress(ProgressUpdate::new(
                PipelineStage::Saving,
                1.0,
                "Outputs saved",
            ));
            Some(saved)
        } else {
            info!("Step 3: Skipping output (save_to_disk disabled)");
            None
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Pipeline finished in {} ms: optimal K = {}",
            duration_ms, selection.optimal_k
        );

        Ok(PipelineResult {
            filtered,
            sparsity,
            selection,
            outputs,
            duration_ms,
        })
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
    index_name: Option<String>,
}

// Ensure PipelineBuilder is Send (can be moved to another thread during construction)
static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    ///
    /// Evaluation updates arrive from worker threads, one per finished K,
    /// in completion order.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// Clone the token and call [`CancellationToken::cancel()`] from
    /// any thread to request cancellation. The pipeline checks the token
    /// between stages and before each K evaluation starts, and returns
    /// [`ImputeError::Cancelled`] if cancellation is requested.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use sparse_impute::{CancellationToken, ImputeError, Pipeline};
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::new();
    /// let token_for_cancel = token.clone();
    ///
    /// thread::spawn(move || {
    ///     thread::sleep(Duration::from_secs(5));
    ///     token_for_cancel.cancel();
    /// });
    ///
    /// let result = Pipeline::builder()
    ///     .cancellation_token(token)
    ///     .build()?
    ///     .process(&matrix);
    ///
    /// if matches!(result, Err(ref e) if e.is_cancelled()) {
    ///     println!("Pipeline was cancelled");
    /// }
    /// ```
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Header of the row-key column in saved tables. Default: `sample`.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let writer = ResultWriter::new(config.output_dir.clone()).with_index_name(
            self.index_name
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
        );

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            writer,
        })
    }
}
