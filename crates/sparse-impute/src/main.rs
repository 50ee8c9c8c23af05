//! CLI entry point for the sparse-matrix imputation pipeline.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde_json::json;
use sparse_impute::{
    ImputeError, Pipeline, PipelineConfig, PipelineResult, PipelineSummary, load_table,
};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Sparse column filtering and KNN imputation for omics matrices",
    long_about = "Removes sparse columns from a numeric matrix, evaluates several KNN \
                  neighbor counts in parallel and imputes the matrix with the best one.\n\n\
                  OUTPUTS (in --output-dir):\n  \
                  sparse_matrix.tsv     matrix after column filtering\n  \
                  imputed_matrix.tsv    matrix imputed with the optimal K\n  \
                  rmse_results.tsv      RMSE for each evaluated K\n\n\
                  EXAMPLES:\n  \
                  sparse-impute betas.tsv\n\n  \
                  sparse-impute betas.tsv --threshold 50 --k-values 1 3 5 --threads 2\n\n  \
                  sparse-impute betas.csv --config run.json --json"
)]
struct Args {
    /// Path to the CSV/TSV matrix; the first column holds the row keys
    input: PathBuf,

    /// Drop columns with more than this percentage of missing values [default: 1.0]
    #[arg(long)]
    threshold: Option<f64>,

    /// Candidate neighbor counts [default: 5 10 15 20]
    #[arg(long = "k-values", num_args = 1..)]
    k_values: Option<Vec<usize>>,

    /// Worker threads for K evaluation [default: 4]
    #[arg(long)]
    threads: Option<usize>,

    /// Directory for result tables [default: output]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON summary.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let config = resolve_config(&args)?;
    info!(
        "Threshold {}%, K = {:?}, {} threads",
        config.threshold_percent, config.k_candidates, config.concurrency
    );

    info!("Loading matrix from: {}", args.input.display());
    let loaded = load_table(&args.input)?;

    let mut builder = Pipeline::builder()
        .config(config)
        .index_name(loaded.index_name.clone());

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    let pipeline = builder.build()?;

    match pipeline.process(&loaded.matrix) {
        Ok(result) => handle_pipeline_output(&result, &args),
        Err(e) => {
            if args.json {
                println!("{}", json!({ "error": &e }));
            }
            error!("Pipeline failed: {}", e);
            Err(pipeline_error(e))
        }
    }
}

/// Start from the config file (or defaults) and apply explicit flags.
fn resolve_config(args: &Args) -> Result<PipelineConfig> {
    let base = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<PipelineConfig>(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    let mut builder = base.to_builder();
    if let Some(threshold) = args.threshold {
        builder = builder.threshold_percent(threshold);
    }
    if let Some(ks) = &args.k_values {
        builder = builder.k_candidates(ks.clone());
    }
    if let Some(threads) = args.threads {
        builder = builder.concurrency(threads);
    }
    if let Some(dir) = &args.output_dir {
        builder = builder.output_dir(dir.clone());
    }

    Ok(builder.build()?)
}

fn pipeline_error(e: ImputeError) -> anyhow::Error {
    anyhow!("Pipeline failed [{}]: {}", e.error_code(), e)
}

/// Print the run summary, as JSON under `--json`.
fn handle_pipeline_output(result: &PipelineResult, args: &Args) -> Result<()> {
    let summary = result.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_human_readable_summary(&summary, args);
    Ok(())
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(summary: &PipelineSummary, args: &Args) {
    println!();
    println!("{}", "=".repeat(60));
    println!("IMPUTATION COMPLETE");
    println!("{}", "=".repeat(60));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        args.input.display(),
        summary.rows,
        summary.columns_before
    );
    if let Some(dir) = &summary.output_dir {
        println!("Output: {dir}/");
    }
    println!();

    println!("Sparsity:");
    println!(
        "  Columns: {} -> {} ({} removed)",
        summary.columns_before,
        summary.columns_after,
        summary.sparsity.columns_removed.len()
    );
    println!(
        "  Missing: {:.2}% -> {:.2}% ({:.2} points reduction)",
        summary.sparsity.original_sparsity,
        summary.sparsity.new_sparsity,
        summary.sparsity.reduction
    );
    println!();

    println!("{:<10} {:>12}", "K Value", "RMSE");
    println!("{}", "-".repeat(23));
    for record in summary.error_table.iter() {
        let marker = if record.k == summary.optimal_k { " *" } else { "" };
        println!("{:<10} {:>12.6}{}", record.k, record.rmse, marker);
    }
    println!();

    println!("Optimal K = {}", summary.optimal_k);
    if summary.remaining_missing > 0 {
        println!(
            "  ! {} cells could not be imputed",
            summary.remaining_missing
        );
    }
    println!("Duration: {}ms", summary.duration_ms);
    println!("{}", "=".repeat(60));
}
