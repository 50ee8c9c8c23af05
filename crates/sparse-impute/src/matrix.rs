//! Immutable sample-by-feature matrix with explicit missing cells.
//!
//! Cells are stored row-major as `Option<f64>`; `None` is the missing
//! marker. Row keys and column names are unique and keep their insertion
//! order. Every transformation in this crate builds a new [`Matrix`].

use crate::error::{ImputeError, Result};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    row_keys: Vec<String>,
    columns: Vec<String>,
    values: Vec<Option<f64>>,
}

static_assertions::assert_impl_all!(Matrix: Send, Sync);

impl Matrix {
    /// Build a matrix from a row-major cell buffer.
    ///
    /// `NaN` cells are stored as missing.
    ///
    /// # Errors
    ///
    /// [`ImputeError::ShapeMismatch`] if `values.len() != rows * columns`,
    /// [`ImputeError::DuplicateKey`] if a row key or column name repeats.
    pub fn new(
        row_keys: Vec<String>,
        columns: Vec<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        let expected = row_keys.len() * columns.len();
        if values.len() != expected {
            return Err(ImputeError::ShapeMismatch {
                expected,
                actual: values.len(),
            });
        }
        ensure_unique("row", &row_keys)?;
        ensure_unique("column", &columns)?;

        let values = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();

        Ok(Self {
            row_keys,
            columns,
            values,
        })
    }

    /// Build a matrix from per-row cell vectors.
    pub fn from_rows(
        row_keys: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        let width = columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ImputeError::ShapeMismatch {
                expected: width,
                actual: bad.len(),
            });
        }
        Self::new(row_keys, columns, rows.into_iter().flatten().collect())
    }

    /// A matrix with the same keys and names but different cells.
    ///
    /// Crate-internal: callers guarantee the buffer length.
    pub(crate) fn with_values(&self, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(values.len(), self.values.len());
        Self {
            row_keys: self.row_keys.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.row_keys.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_cols() == 0
    }

    pub fn row_keys(&self) -> &[String] {
        &self.row_keys
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row-major cell buffer.
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values[row * self.n_cols() + col]
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        let width = self.n_cols();
        &self.values[row * width..(row + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
        // chunks(0) panics, and a zero-width matrix has no cells to yield anyway
        let width = self.n_cols().max(1);
        self.values.chunks(width)
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, col: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        (0..self.n_rows()).map(move |row| self.get(row, col))
    }

    /// Missing cells per column, in column order.
    pub fn missing_per_column(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_cols()];
        for row in self.rows() {
            for (count, cell) in counts.iter_mut().zip(row) {
                if cell.is_none() {
                    *count += 1;
                }
            }
        }
        counts
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(Option::is_none)
    }

    /// Percentage (0-100) of missing cells; `0.0` for an empty matrix.
    pub fn sparsity_percent(&self) -> f64 {
        let total = self.values.len();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.missing_count() as f64 / total as f64
    }

    /// Positions holding an observed value, as a row-major boolean mask.
    pub fn observed_mask(&self) -> Vec<bool> {
        self.values.iter().map(Option::is_some).collect()
    }

    /// New matrix containing only the listed columns, in the given order.
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        let mut values = Vec::with_capacity(self.n_rows() * keep.len());
        for row in self.rows().take(self.n_rows()) {
            values.extend(keep.iter().map(|&c| row[c]));
        }
        Self {
            row_keys: self.row_keys.clone(),
            columns: keep.iter().map(|&c| self.columns[c].clone()).collect(),
            values,
        }
    }
}

fn ensure_unique(axis: &'static str, keys: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        if !seen.insert(key.as_str()) {
            return Err(ImputeError::DuplicateKey {
                axis,
                key: key.clone(),
            });
        }
    }
    Ok(())
}
