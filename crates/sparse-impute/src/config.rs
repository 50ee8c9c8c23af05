//! Configuration types for the imputation pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. Configurations also
//! deserialize from JSON; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default sparse-column threshold, in percent of rows.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 1.0;

/// Default neighbor counts evaluated by the K selector.
pub const DEFAULT_K_CANDIDATES: [usize; 4] = [5, 10, 15, 20];

/// Default number of worker threads used for K evaluation.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for the imputation pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use sparse_impute::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .threshold_percent(50.0)
///     .k_candidates(vec![1, 3, 5])
///     .concurrency(2)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Columns with more than this percentage of missing cells are dropped.
    /// No upper bound: values above 100 keep every column.
    /// Default: 1.0
    pub threshold_percent: f64,

    /// Neighbor counts to evaluate, in tie-break precedence order.
    /// Default: [5, 10, 15, 20]
    pub k_candidates: Vec<usize>,

    /// Worker threads for candidate evaluation.
    /// Default: 4
    pub concurrency: usize,

    /// Directory receiving the result tables.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Whether the pipeline writes its result tables.
    /// When false, results are only returned in memory.
    /// Default: true
    pub save_to_disk: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            k_candidates: DEFAULT_K_CANDIDATES.to_vec(),
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("output"),
            save_to_disk: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Start a builder pre-filled with this configuration's values.
    pub fn to_builder(&self) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            threshold_percent: Some(self.threshold_percent),
            k_candidates: Some(self.k_candidates.clone()),
            concurrency: Some(self.concurrency),
            output_dir: Some(self.output_dir.clone()),
            save_to_disk: Some(self.save_to_disk),
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.threshold_percent.is_finite() || self.threshold_percent < 0.0 {
            return Err(ConfigValidationError::InvalidThreshold(
                self.threshold_percent,
            ));
        }

        if self.k_candidates.is_empty() {
            return Err(ConfigValidationError::EmptyKCandidates);
        }

        if let Some(position) = self.k_candidates.iter().position(|&k| k == 0) {
            return Err(ConfigValidationError::InvalidKCandidate { position });
        }

        if self.concurrency == 0 {
            return Err(ConfigValidationError::InvalidConcurrency(self.concurrency));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold: {0} (must be a finite percentage >= 0)")]
    InvalidThreshold(f64),

    #[error("No candidate K values given")]
    EmptyKCandidates,

    #[error("Invalid candidate K at position {position}: K must be at least 1")]
    InvalidKCandidate { position: usize },

    #[error("Invalid concurrency: {0} (must be at least 1)")]
    InvalidConcurrency(usize),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    threshold_percent: Option<f64>,
    k_candidates: Option<Vec<usize>>,
    concurrency: Option<usize>,
    output_dir: Option<PathBuf>,
    save_to_disk: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the sparse-column threshold.
    ///
    /// # Arguments
    /// * `threshold` - Percentage of rows, e.g. `50.0` drops columns missing
    ///   in more than half of the samples
    pub fn threshold_percent(mut self, threshold: f64) -> Self {
        self.threshold_percent = Some(threshold);
        self
    }

    /// Set the neighbor counts to evaluate.
    pub fn k_candidates(mut self, candidates: impl Into<Vec<usize>>) -> Self {
        self.k_candidates = Some(candidates.into());
        self
    }

    /// Set the number of worker threads.
    pub fn concurrency(mut self, threads: usize) -> Self {
        self.concurrency = Some(threads);
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Enable or disable writing result tables.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            threshold_percent: self
                .threshold_percent
                .unwrap_or(DEFAULT_THRESHOLD_PERCENT),
            k_candidates: self
                .k_candidates
                .unwrap_or_else(|| DEFAULT_K_CANDIDATES.to_vec()),
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            save_to_disk: self.save_to_disk.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
