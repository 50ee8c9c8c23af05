//! Reconstruction error measured on originally observed cells.

use crate::error::{ImputeError, Result};
use crate::matrix::Matrix;

/// Root-mean-square error between two paired value sequences.
///
/// Returns `None` for empty input.
pub fn rmse(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let mut sum_squared = 0.0;
    let mut n = 0usize;
    for (a, b) in pairs {
        let diff = a - b;
        sum_squared += diff * diff;
        n += 1;
    }
    (n > 0).then(|| (sum_squared / n as f64).sqrt())
}

/// RMSE of `reconstruction` against `original` over `mask`, the
/// non-missing mask of `original` (see [`Matrix::observed_mask`]).
///
/// `k` only labels the error. The reconstruction must be fully populated;
/// a cell it left missing means some column had nothing to impute from.
///
/// # Errors
///
/// [`ImputeError::ShapeMismatch`] for differently sized matrices, and
/// [`ImputeError::EvaluationFailed`] when the reconstruction still has a
/// missing cell, the mask is empty, or the error is not finite.
pub fn masked_rmse(
    original: &Matrix,
    reconstruction: &Matrix,
    mask: &[bool],
    k: usize,
) -> Result<f64> {
    if original.shape() != reconstruction.shape() || mask.len() != original.values().len() {
        return Err(ImputeError::ShapeMismatch {
            expected: original.values().len(),
            actual: reconstruction.values().len(),
        });
    }

    if let Some(pos) = reconstruction.values().iter().position(Option::is_none) {
        let column = &reconstruction.columns()[pos % reconstruction.n_cols()];
        return Err(ImputeError::evaluation_failed(
            k,
            format!(
                "column '{}' has no observed values; {} cells could not be imputed",
                column,
                reconstruction.missing_count()
            ),
        ));
    }

    let pairs = original
        .values()
        .iter()
        .zip(reconstruction.values())
        .zip(mask)
        .filter(|&(_, &observed)| observed)
        .filter_map(|((a, b), _)| Some(((*a)?, (*b)?)));

    match rmse(pairs) {
        None => Err(ImputeError::evaluation_failed(
            k,
            "matrix has no observed values to score against",
        )),
        Some(value) if !value.is_finite() => Err(ImputeError::evaluation_failed(
            k,
            format!("reconstruction error is not finite ({value})"),
        )),
        Some(value) => Ok(value),
    }
}
