//! Delimited-table loading.
//!
//! The first column of the file is the row index; every other column must
//! be numeric. The delimiter is sniffed from the header line.

use crate::error::{ImputeError, Result, ResultExt};
use crate::matrix::Matrix;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Header used for the index column when the file leaves it blank.
pub const DEFAULT_INDEX_NAME: &str = "sample";

/// Cell spellings read as missing, in addition to empty fields.
const MISSING_MARKERS: [&str; 4] = ["NA", "NaN", "nan", "null"];

const CANDIDATE_DELIMITERS: [u8; 3] = [b'\t', b',', b';'];

/// A matrix together with the name of the index column it was read with.
#[derive(Debug, Clone)]
pub struct LoadedMatrix {
    pub matrix: Matrix,
    pub index_name: String,
}

/// Load a CSV/TSV file into a [`Matrix`].
pub fn load_matrix(path: impl AsRef<Path>) -> Result<Matrix> {
    Ok(load_table(path)?.matrix)
}

/// Load a CSV/TSV file, keeping the index column's header.
///
/// # Errors
///
/// [`ImputeError::NonNumericColumn`] for a data column holding text,
/// [`ImputeError::DuplicateKey`] for repeated row or column labels, and
/// IO or parse errors wrapped with the file path as context.
pub fn load_table(path: impl AsRef<Path>) -> Result<LoadedMatrix> {
    let path = path.as_ref();
    let context = format!("Failed to load '{}'", path.display());

    let separator = detect_delimiter(path).context(context.clone())?;
    debug!(
        "Reading {} with separator {:?}",
        path.display(),
        separator as char
    );

    let null_values = NullValues::AllColumns(MISSING_MARKERS.iter().map(|&m| m.into()).collect());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"'))
                .with_null_values(Some(null_values)),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(context.clone())?
        .finish()
        .context(context.clone())?;

    let loaded = dataframe_to_matrix(&df).context(context)?;
    info!(
        "Loaded {} rows x {} columns from {}",
        loaded.matrix.n_rows(),
        loaded.matrix.n_cols(),
        path.display()
    );
    Ok(loaded)
}

/// Convert a frame whose first column is the row index.
pub fn dataframe_to_matrix(df: &DataFrame) -> Result<LoadedMatrix> {
    let columns = df.get_columns();
    let Some((index, data)) = columns.split_first() else {
        return Err(ImputeError::InputShape {
            rows: 0,
            columns: 0,
            reason: "table has no columns".to_string(),
        });
    };

    let index_name = match index.name().as_str() {
        "" => DEFAULT_INDEX_NAME.to_string(),
        name => name.to_string(),
    };

    let keys = index.cast(&DataType::String)?;
    let row_keys: Vec<String> = keys
        .str()?
        .into_iter()
        .map(|key| key.unwrap_or_default().to_string())
        .collect();

    let mut column_names = Vec::with_capacity(data.len());
    let mut column_values = Vec::with_capacity(data.len());
    for column in data {
        column_names.push(column.name().to_string());
        column_values.push(numeric_values(column)?);
    }

    let n_rows = row_keys.len();
    let mut values = Vec::with_capacity(n_rows * data.len());
    for row in 0..n_rows {
        values.extend(column_values.iter().map(|col| col[row]));
    }

    Ok(LoadedMatrix {
        matrix: Matrix::new(row_keys, column_names, values)?,
        index_name,
    })
}

fn numeric_values(column: &Column) -> Result<Vec<Option<f64>>> {
    // columns that are entirely missing infer as String
    if column.null_count() == column.len() {
        return Ok(vec![None; column.len()]);
    }

    let dtype = column.dtype();
    if matches!(dtype, DataType::String | DataType::Boolean) {
        return Err(ImputeError::NonNumericColumn {
            column: column.name().to_string(),
            dtype: dtype.to_string(),
        });
    }

    let cast = column
        .cast(&DataType::Float64)
        .map_err(|_| ImputeError::NonNumericColumn {
            column: column.name().to_string(),
            dtype: dtype.to_string(),
        })?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Pick the delimiter that occurs most often in the header line.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    Ok(sniff_delimiter(&header))
}

/// Tab wins ties and is the fallback for a single-column header.
pub(crate) fn sniff_delimiter(header: &str) -> u8 {
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, header.bytes().filter(|&b| b == d).count()))
        .fold((b'\t', 0), |best, (d, count)| {
            if count > best.1 { (d, count) } else { best }
        })
        .0
}
