use crate::error::{Result, ResultExt};
use crate::loader::DEFAULT_INDEX_NAME;
use crate::matrix::Matrix;
use crate::types::ErrorTable;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

pub const SPARSE_MATRIX_FILE: &str = "sparse_matrix.tsv";
pub const IMPUTED_MATRIX_FILE: &str = "imputed_matrix.tsv";
pub const RMSE_RESULTS_FILE: &str = "rmse_results.tsv";

/// Paths of the tables written by [`ResultWriter::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedOutputs {
    pub sparse_matrix: PathBuf,
    pub imputed_matrix: PathBuf,
    pub rmse_results: PathBuf,
}

/// Writes the filtered matrix, the imputed matrix and the error table as
/// tab-separated files.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output_dir: PathBuf,
    index_name: String,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }

    /// Header written above the row keys.
    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory and write all three tables into it.
    ///
    /// Existing files with the same names are overwritten.
    pub fn save(
        &self,
        filtered: &Matrix,
        imputed: &Matrix,
        error_table: &ErrorTable,
    ) -> Result<SavedOutputs> {
        fs::create_dir_all(&self.output_dir).context(format!(
            "Failed to create output directory '{}'",
            self.output_dir.display()
        ))?;

        let outputs = SavedOutputs {
            sparse_matrix: self.output_dir.join(SPARSE_MATRIX_FILE),
            imputed_matrix: self.output_dir.join(IMPUTED_MATRIX_FILE),
            rmse_results: self.output_dir.join(RMSE_RESULTS_FILE),
        };

        let mut sparse = matrix_to_dataframe(filtered, &self.index_name)?;
        write_tsv(&mut sparse, &outputs.sparse_matrix)?;

        let mut complete = matrix_to_dataframe(imputed, &self.index_name)?;
        write_tsv(&mut complete, &outputs.imputed_matrix)?;

        let mut errors = error_table_to_dataframe(error_table)?;
        write_tsv(&mut errors, &outputs.rmse_results)?;

        info!("Outputs saved to '{}'", self.output_dir.display());
        Ok(outputs)
    }
}

/// Write the three result tables into `output_dir` with the default index header.
pub fn save_results(
    filtered: &Matrix,
    imputed: &Matrix,
    error_table: &ErrorTable,
    output_dir: impl Into<PathBuf>,
) -> Result<SavedOutputs> {
    ResultWriter::new(output_dir).save(filtered, imputed, error_table)
}

/// Frame with the row keys as a leading `index_name` column.
pub fn matrix_to_dataframe(matrix: &Matrix, index_name: &str) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(matrix.n_cols() + 1);
    columns.push(Column::new(index_name.into(), matrix.row_keys().to_vec()));

    for (idx, name) in matrix.columns().iter().enumerate() {
        let values: Vec<Option<f64>> = matrix.column(idx).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }

    Ok(DataFrame::new(columns)?)
}

/// Two-column frame `K Value` / `RMSE` in candidate order.
pub fn error_table_to_dataframe(error_table: &ErrorTable) -> Result<DataFrame> {
    let ks: Vec<u64> = error_table.iter().map(|r| r.k as u64).collect();
    let rmses: Vec<f64> = error_table.iter().map(|r| r.rmse).collect();

    Ok(DataFrame::new(vec![
        Column::new("K Value".into(), ks),
        Column::new("RMSE".into(), rmses),
    ])?)
}

fn write_tsv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let context = format!("Failed to write '{}'", path.display());
    let mut file = File::create(path).context(context.clone())?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .finish(df)
        .context(context)?;

    info!("Saved {}", path.display());
    Ok(())
}
